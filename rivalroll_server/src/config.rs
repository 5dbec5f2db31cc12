use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use rivalroll_core::{derive_hash_hex, Roster, SpinRng, SpinTiming};
use tracing::info;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub bind: String,
    pub api_key: String,
    pub characters_dir: PathBuf,
    pub roster_file: Option<PathBuf>,
    pub seed_phrase: Option<String>,
    pub timing: SpinTiming,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let timing = match lookup("SPIN_DURATION_MS") {
            Some(raw) => {
                let ms: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid SPIN_DURATION_MS `{raw}`"))?;
                SpinTiming::with_total(Duration::from_millis(ms))
            }
            None => SpinTiming::default(),
        };
        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://rivalroll.db".into()),
            bind: lookup("BIND").unwrap_or_else(|| "127.0.0.1:8080".into()),
            api_key: lookup("API_KEY").unwrap_or_else(|| "dev-key".into()),
            characters_dir: lookup("CHARACTERS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public/characters")),
            roster_file: lookup("ROSTER_FILE").map(PathBuf::from),
            seed_phrase: lookup("SPIN_SEED").filter(|s| !s.is_empty()),
            timing,
        })
    }

    pub fn load_roster(&self) -> anyhow::Result<Roster> {
        match &self.roster_file {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading roster file {}", path.display()))?;
                let roster = Roster::from_json(&json)
                    .with_context(|| format!("parsing roster file {}", path.display()))?;
                anyhow::ensure!(!roster.is_empty(), "roster file {} is empty", path.display());
                Ok(roster)
            }
            None => Ok(Roster::default_roster()),
        }
    }

    pub fn rng(&self) -> SpinRng {
        match &self.seed_phrase {
            Some(phrase) => {
                info!(seed_hash = %derive_hash_hex(phrase.as_bytes()), "using seeded session rng");
                SpinRng::from_seed_phrase(phrase)
            }
            None => SpinRng::from_entropy(),
        }
    }
}
