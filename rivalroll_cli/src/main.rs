use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use rivalroll_core::{
    reduce, Action, Frame, HistoryEntry, ImageCatalog, PlayerId, Roster, SessionState,
    SpinAnimation, SpinRng, SpinTiming, Transition,
};

#[derive(Parser)]
#[command(name = "rivalroll-cli", about = "Admin CLI for the rivalroll server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Database URL, default sqlite://rivalroll.db
    #[arg(long, value_parser, env = "DATABASE_URL")]
    database_url: Option<String>,
    /// Character image directory, default public/characters
    #[arg(long, env = "CHARACTERS_DIR", default_value = "public/characters")]
    characters_dir: PathBuf,
    /// JSON array of character names replacing the built-in roster
    #[arg(long, env = "ROSTER_FILE")]
    roster_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the character manifest with the image directory
    Sync,
    /// Mark a catalog character as the default
    SetDefault { id: String },
    /// Show the newest history entries
    History {
        #[arg(long)]
        player: Option<String>,
        #[arg(default_value_t = 20)]
        n: usize,
    },
    /// List characters still available to both players
    Pool,
    /// Clear both histories (stop the server first)
    Purge,
    /// Export both histories to CSV path
    ExportCsv { path: String },
    /// Play alternating spins offline and print the picks
    Simulate {
        #[arg(long)]
        seed: Option<String>,
        #[arg(long, default_value_t = 10)]
        rounds: usize,
    },
}

async fn get_pool(url: Option<String>) -> anyhow::Result<SqlitePool> {
    let url = url.unwrap_or_else(|| "sqlite://rivalroll.db".into());
    debug!(%url, "opening database");
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    sqlx::migrate!("../rivalroll_server/migrations")
        .run(&pool)
        .await?;
    Ok(pool)
}

async fn load_history(pool: &SqlitePool, player: PlayerId) -> anyhow::Result<Vec<HistoryEntry>> {
    let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
        .bind(player.history_key())
        .fetch_optional(pool)
        .await?;
    match row {
        Some(r) => {
            let raw: String = r.get("value");
            serde_json::from_str(&raw)
                .with_context(|| format!("decoding {}", player.history_key()))
        }
        None => Ok(Vec::new()),
    }
}

fn load_roster(path: Option<&PathBuf>) -> anyhow::Result<Roster> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading roster file {}", path.display()))?;
            Ok(Roster::from_json(&json)?)
        }
        None => Ok(Roster::default_roster()),
    }
}

/// Histories are stored newest first.
fn newest(history: &[HistoryEntry], n: usize) -> &[HistoryEntry] {
    &history[..n.min(history.len())]
}

fn format_ts(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

/// Runs one animation against a simulated clock; returns the resting center.
fn settle(anim: &mut SpinAnimation) -> String {
    let mut now = Instant::now();
    loop {
        if let Frame::Finished(window) = anim.tick(now) {
            return window.center.name;
        }
        now += anim.next_delay(now);
    }
}

fn simulate(roster: Roster, seed: Option<String>, rounds: usize) -> anyhow::Result<()> {
    let mut rng = match &seed {
        Some(phrase) => {
            println!("seed hash {}", rivalroll_core::derive_hash_hex(phrase.as_bytes()));
            SpinRng::from_seed_phrase(phrase)
        }
        None => SpinRng::from_entropy(),
    };
    let mut state = SessionState::new(roster);
    let mut turn = PlayerId::N;
    for round in 1..=rounds {
        let pool = state.candidates_for(turn);
        let (next, outcome) = reduce(state, &Action::Spin(turn), &mut rng);
        state = next;
        let target = match outcome {
            Ok(Transition::SpinStarted { target, .. }) => target,
            Ok(other) => anyhow::bail!("unexpected transition {other:?}"),
            Err(err) if err.is_empty_pool() => {
                println!("{turn}: pool exhausted after {} round(s)", round - 1);
                break;
            }
            Err(err) => return Err(err.into()),
        };
        let mut anim = SpinAnimation::start(
            turn,
            target,
            &pool,
            state.roster(),
            SpinTiming::default(),
            &mut rng,
            Instant::now(),
        );
        let landed = settle(&mut anim);
        let timestamp = Utc::now().timestamp_millis();
        let (next, outcome) = reduce(state, &Action::Commit { player: turn, timestamp }, &mut rng);
        state = next;
        outcome?;
        println!("#{round:>3} {} -> {landed}", turn.theme().display_name);
        turn = turn.other();
    }
    println!("{} character(s) left", state.available_pool().len());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sync => {
            let catalog = ImageCatalog::new(&cli.characters_dir);
            let config = catalog.sync()?;
            println!(
                "Synced {} character image(s), default {}",
                config.characters.len(),
                config.default_character.as_deref().unwrap_or("-")
            );
        }
        Commands::SetDefault { id } => {
            let catalog = ImageCatalog::new(&cli.characters_dir);
            catalog.sync()?;
            anyhow::ensure!(catalog.set_default(&id)?, "character {id} not found");
            println!("Default character set to {id}");
        }
        Commands::History { player, n } => {
            let pool = get_pool(cli.database_url).await?;
            let players = match player {
                Some(raw) => vec![raw.parse::<PlayerId>()?],
                None => PlayerId::ALL.to_vec(),
            };
            for id in players {
                let history = load_history(&pool, id).await?;
                println!("{} ({} pick(s))", id.theme().display_name, history.len());
                for entry in newest(&history, n) {
                    println!("  {} {}", format_ts(entry.timestamp), entry.character_name);
                }
            }
        }
        Commands::Pool => {
            let pool = get_pool(cli.database_url).await?;
            let roster = load_roster(cli.roster_file.as_ref())?;
            let state = SessionState::with_histories(
                roster,
                load_history(&pool, PlayerId::N).await?,
                load_history(&pool, PlayerId::S).await?,
            );
            let available = state.available_pool();
            println!("{} character(s) available", available.len());
            for character in available {
                println!("  {}", character.name);
            }
        }
        Commands::Purge => {
            let pool = get_pool(cli.database_url).await?;
            for id in PlayerId::ALL {
                sqlx::query(
                    "INSERT INTO kv (key, value) VALUES (?, '[]') \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                )
                .bind(id.history_key())
                .execute(&pool)
                .await?;
            }
            println!("Purged both histories");
        }
        Commands::ExportCsv { path } => {
            let pool = get_pool(cli.database_url).await?;
            let mut wtr = csv::Writer::from_path(&path)?;
            wtr.write_record(["player", "character", "timestamp", "at"])?;
            let mut total = 0;
            for id in PlayerId::ALL {
                for entry in load_history(&pool, id).await? {
                    wtr.write_record([
                        id.as_str().to_string(),
                        entry.character_name,
                        entry.timestamp.to_string(),
                        format_ts(entry.timestamp),
                    ])?;
                    total += 1;
                }
            }
            wtr.flush()?;
            println!("Exported {} rows to {}", total, path);
        }
        Commands::Simulate { seed, rounds } => {
            simulate(load_roster(cli.roster_file.as_ref())?, seed, rounds)?;
        }
    }

    Ok(())
}
