use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub use rivalroll_shared::CharacterImage;

pub const IMAGES_SUBDIR: &str = "images";
pub const DEFAULTS_SUBDIR: &str = "defaults";
pub const CONFIG_FILE_NAME: &str = "characters.json";
pub const PUBLIC_IMAGES_PREFIX: &str = "/characters/images/";
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_character: Option<String>,
    #[serde(default)]
    pub characters: BTreeMap<String, CharacterImage>,
}

impl CatalogConfig {
    pub fn default_entry(&self) -> Option<&CharacterImage> {
        self.default_character
            .as_ref()
            .and_then(|id| self.characters.get(id))
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("only WebP files are allowed")]
    InvalidType,
    #[error("file size must be less than 10MB (got {size} bytes)")]
    TooLarge { size: usize },
    #[error("a character image named {0} already exists")]
    AlreadyExists(String),
    #[error("file name is empty once sanitized")]
    EmptyName,
}

pub fn is_webp(filename: &str) -> bool {
    filename.to_lowercase().ends_with(".webp")
}

/// Catalog id of an image file: the file name without its `.webp` extension.
pub fn id_from_filename(filename: &str) -> String {
    if is_webp(filename) {
        filename[..filename.len() - ".webp".len()].to_string()
    } else {
        filename.to_string()
    }
}

/// Lowercases, replaces anything outside `[a-z0-9.-]` with `-`, collapses
/// dash runs and trims dashes from both ends.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.to_lowercase().chars() {
        let ch = if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '.' {
            ch
        } else {
            '-'
        };
        if ch == '-' && out.ends_with('-') {
            continue;
        }
        out.push(ch);
    }
    out.trim_matches('-').to_string()
}

pub fn display_name(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    let mut prev_word = false;
    for ch in id.chars().map(|c| if c == '-' { ' ' } else { c }) {
        let word = ch.is_ascii_alphanumeric() || ch == '_';
        if word && !prev_word {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
        prev_word = word;
    }
    out
}

/// Reconciles `config` with the file names found in the images directory.
pub fn reconcile(mut config: CatalogConfig, files: &[String], now: DateTime<Utc>) -> CatalogConfig {
    let webp: Vec<&String> = files.iter().filter(|f| is_webp(f)).collect();

    for filename in &webp {
        let id = id_from_filename(filename);
        if !config.characters.contains_key(&id) {
            info!(%id, "catalog: adding character image");
            config.characters.insert(
                id.clone(),
                CharacterImage {
                    name: display_name(&id),
                    filename: (*filename).clone(),
                    path: format!("{PUBLIC_IMAGES_PREFIX}{filename}"),
                    is_default: false,
                    uploaded_at: now,
                    id,
                },
            );
        }
    }

    config.characters.retain(|id, image| {
        let keep = webp.iter().any(|f| **f == image.filename);
        if !keep {
            info!(%id, "catalog: removing character image with missing file");
        }
        keep
    });

    let default_valid = config
        .default_character
        .as_ref()
        .is_some_and(|id| config.characters.contains_key(id));
    if !default_valid {
        config.default_character = None;
        if let Some((id, image)) = config.characters.iter_mut().next() {
            image.is_default = true;
            config.default_character = Some(id.clone());
        }
    }
    config
}

#[derive(Debug, Clone)]
pub struct ImageCatalog {
    root: PathBuf,
}

impl ImageCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_SUBDIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(DEFAULTS_SUBDIR).join(CONFIG_FILE_NAME)
    }

    pub fn ensure_dirs(&self) -> Result<(), CatalogError> {
        fs::create_dir_all(self.images_dir())?;
        fs::create_dir_all(self.root.join(DEFAULTS_SUBDIR))?;
        Ok(())
    }

    /// Reads the manifest. A missing manifest is created empty; an unreadable
    /// one is logged and replaced by an empty catalog in memory.
    pub fn load(&self) -> CatalogConfig {
        match self.try_load() {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, path = %self.config_path().display(), "catalog: failed to load, using empty catalog");
                CatalogConfig::default()
            }
        }
    }

    fn try_load(&self) -> Result<CatalogConfig, CatalogError> {
        self.ensure_dirs()?;
        match fs::read_to_string(self.config_path()) {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let config = CatalogConfig::default();
                self.save(&config)?;
                Ok(config)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self, config: &CatalogConfig) -> Result<(), CatalogError> {
        self.ensure_dirs()?;
        fs::write(self.config_path(), serde_json::to_string_pretty(config)?)?;
        Ok(())
    }

    pub fn image_files(&self) -> Result<Vec<String>, CatalogError> {
        self.ensure_dirs()?;
        let mut files = Vec::new();
        for entry in fs::read_dir(self.images_dir())? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn sync(&self) -> Result<CatalogConfig, CatalogError> {
        let config = reconcile(self.load(), &self.image_files()?, Utc::now());
        self.save(&config)?;
        info!(
            characters = config.characters.len(),
            default = config.default_character.as_deref().unwrap_or("none"),
            "catalog synced"
        );
        Ok(config)
    }

    pub fn set_default(&self, id: &str) -> Result<bool, CatalogError> {
        let mut config = self.load();
        if !config.characters.contains_key(id) {
            return Ok(false);
        }
        for (key, image) in config.characters.iter_mut() {
            image.is_default = key == id;
        }
        config.default_character = Some(id.to_string());
        self.save(&config)?;
        Ok(true)
    }

    /// The default entry, or the first entry when no default is recorded.
    pub fn default_character(&self) -> Option<CharacterImage> {
        let config = self.load();
        config
            .default_entry()
            .or_else(|| config.characters.values().next())
            .cloned()
    }

    /// Validates and writes an uploaded image, then syncs the manifest.
    pub fn store_upload(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Option<CharacterImage>, CatalogError> {
        if !is_webp(file_name) {
            return Err(CatalogError::InvalidType);
        }
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(CatalogError::TooLarge { size: bytes.len() });
        }
        let sanitized = sanitize_file_name(file_name);
        if !is_webp(&sanitized) || id_from_filename(&sanitized).is_empty() {
            return Err(CatalogError::EmptyName);
        }
        self.ensure_dirs()?;
        let path = self.images_dir().join(&sanitized);
        if path.exists() {
            return Err(CatalogError::AlreadyExists(sanitized));
        }
        fs::write(&path, bytes)?;
        info!(file = %sanitized, size = bytes.len(), "catalog: stored upload");
        let mut config = self.sync()?;
        Ok(config.characters.remove(&id_from_filename(&sanitized)))
    }
}
