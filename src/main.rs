//! Command line interface for the game store. Supports initialization,
//! ingesting events, resolving and inspecting games, signing new games and
//! moves, converting ids, and serving the HTTP API.

use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{bail, Context};
use chesstr::{
    codec,
    config::Settings,
    event::{Event, EventId},
    game::{self, tree_entries, Games, HeadState, HeadView},
    ident, server,
    storage::Store,
};
use clap::{Parser, Subcommand};
use secp256k1::Keypair;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "chesstr",
    author,
    version,
    about = "Chess games resolved from signed Nostr events"
)]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the directory tree at `STORE_ROOT`.
    Init,
    /// Ingest one or more event files.
    Ingest {
        /// Paths to JSON event files to ingest.
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Rebuild the per-game index from stored events.
    Reindex,
    /// Verify a random sample of stored events.
    Verify {
        #[arg(long, default_value_t = 1000)]
        sample: usize,
    },
    /// Print the canonical head of a game.
    Head {
        /// Game id as hex or `note1…`.
        game: String,
    },
    /// List every admitted move of a game; `*` marks the canonical path.
    Tree {
        /// Game id as hex or `note1…`.
        game: String,
    },
    /// Sign and store a new game start.
    NewGame {
        #[command(flatten)]
        signing: Signing,
    },
    /// Sign and store a move.
    Play {
        /// Game id as hex or `note1…`.
        game: String,
        /// Move in standard algebraic notation.
        san: String,
        /// Move to continue from instead of the current head.
        #[arg(long)]
        parent: Option<String>,
        #[command(flatten)]
        signing: Signing,
    },
    /// Encode a hex event id as `note1…`.
    Encode { hex: String },
    /// Decode a `note1…` id to hex.
    Decode { note: String },
    /// Launch the HTTP service.
    Serve,
}

/// Options shared by commands that sign events.
#[derive(clap::Args)]
struct Signing {
    /// Hex secret key; defaults to `SECRET_KEY`.
    #[arg(long)]
    secret_key: Option<String>,
    /// Event timestamp; defaults to now.
    #[arg(long)]
    created_at: Option<u64>,
}

impl Signing {
    fn keys(&self, cfg: &Settings) -> anyhow::Result<Keypair> {
        let Some(secret) = self.secret_key.as_ref().or(cfg.secret_key.as_ref()) else {
            bail!("no signing key: pass --secret-key or set SECRET_KEY");
        };
        codec::keypair_from_hex(secret)
    }

    fn created_at(&self) -> anyhow::Result<u64> {
        match self.created_at {
            Some(ts) => Ok(ts),
            None => Ok(SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .context("system clock before 1970")?
                .as_secs()),
        }
    }
}

/// Execute the selected CLI subcommand.
async fn run(cli: Cli) -> anyhow::Result<()> {
    ensure_env_file(&cli.env)?;
    let cfg = Settings::from_env(&cli.env)?;
    let store = Store::new(cfg.store_root.clone(), cfg.verify_sig);
    match cli.command {
        Commands::Init => {
            // Create the on-disk directory structure.
            store.init()?;
        }
        Commands::Ingest { files } => {
            // Raw persistence: the resolver re-validates whatever is stored.
            let mut added = 0;
            for f in &files {
                let data = fs::read_to_string(f).with_context(|| format!("reading {f}"))?;
                let ev: Event =
                    serde_json::from_str(&data).with_context(|| format!("parsing {f}"))?;
                if store.ingest(&ev).with_context(|| format!("ingesting {f}"))? {
                    added += 1;
                }
            }
            info!(files = files.len(), added, "ingest finished");
        }
        Commands::Reindex => {
            let count = store.reindex()?;
            info!(events = count, "reindex finished");
        }
        Commands::Verify { sample } => {
            // Randomly verify ids and signatures for `sample` events.
            let checked = store.verify_sample(sample)?;
            info!(checked, "verify finished");
        }
        Commands::Head { game } => {
            let game = ident::parse_game_ref(&game)?;
            let games = Games::new(store);
            match games.resolve_head(&game)? {
                HeadState::Resolved(res) => {
                    println!("{}", serde_json::to_string_pretty(&HeadView::from(&res))?)
                }
                HeadState::Pending => println!(
                    "{}",
                    serde_json::json!({ "game": game.to_hex(), "status": "pending" })
                ),
            }
        }
        Commands::Tree { game } => {
            let game = ident::parse_game_ref(&game)?;
            let tree = Games::new(store).snapshot(&game)?;
            if tree.root().is_none() {
                warn!(game = %game, "no valid start for game");
            }
            for entry in tree_entries(&tree) {
                println!(
                    "{} {:>3} {:<8} {} parent={}",
                    if entry.canonical { '*' } else { ' ' },
                    entry.ply,
                    entry.mv.as_deref().unwrap_or("start"),
                    entry.id,
                    entry.parent.as_deref().unwrap_or("-"),
                );
            }
        }
        Commands::NewGame { signing } => {
            let keys = signing.keys(&cfg)?;
            let ev = game::new_start(&keys, signing.created_at()?)?;
            publish(&Games::new(store), ev)?;
        }
        Commands::Play {
            game,
            san,
            parent,
            signing,
        } => {
            let keys = signing.keys(&cfg)?;
            let game = ident::parse_game_ref(&game)?;
            let games = Games::new(store);
            let parent = match parent {
                Some(p) => {
                    let id = ident::parse_game_ref(&p)?;
                    games
                        .snapshot(&game)?
                        .node(&id)
                        .with_context(|| format!("{id} is not an admitted move of {game}"))?
                }
                None => match games.resolve_head(&game)? {
                    HeadState::Resolved(res) => res.head,
                    HeadState::Pending => bail!("game {game} has no valid start yet"),
                },
            };
            let ev = game::new_move(&keys, &parent, &san, signing.created_at()?)?;
            publish(&games, ev)?;
        }
        Commands::Encode { hex } => {
            let id = EventId::from_hex(&hex).with_context(|| format!("not a hex event id: {hex}"))?;
            println!("{}", ident::encode(&id));
        }
        Commands::Decode { note } => {
            println!("{}", ident::decode(&note)?);
        }
        Commands::Serve => {
            // Initialize storage then start the HTTP server.
            store.init()?;
            let http_addr: SocketAddr = cfg.require_bind_http()?.parse()?;
            let games = Arc::new(Games::new(store));
            server::serve_http(http_addr, games, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        }
    }
    Ok(())
}

/// Store a freshly signed event and print it for publishing elsewhere.
fn publish(games: &Games<Store>, ev: Event) -> anyhow::Result<()> {
    games.ingest(ev.clone())?;
    let id = EventId::from_hex(&ev.id).context("signed event has no id")?;
    info!(id = %id, note = %ident::encode(&id), "event signed");
    println!("{}", serde_json::to_string(&ev)?);
    Ok(())
}

/// Create a default `.env` file if one is not already present at `path`.
fn ensure_env_file(path: &str) -> anyhow::Result<()> {
    let env_path = Path::new(path);
    if env_path.exists() {
        return Ok(());
    }
    if let Some(parent) = env_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let base_dir = match env_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    let store_root = base_dir.join("chesstr-data");
    let mut content = String::new();
    content.push_str(&format!("STORE_ROOT={}\n", display_path(&store_root)));
    content.push_str("BIND_HTTP=127.0.0.1:7780\n");
    content.push_str("VERIFY_SIG=0\n");
    content.push_str("SECRET_KEY=\n");
    fs::write(env_path, content)?;
    Ok(())
}

fn display_path(path: &PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

/// Install the global subscriber; logs go to stderr so stdout stays parseable.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("CHESSTR_LOG")
        .unwrap_or_else(|_| "chesstr=info".into());
    let format = std::env::var("CHESSTR_LOG_FORMAT").unwrap_or_default();
    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run(cli).await
}
