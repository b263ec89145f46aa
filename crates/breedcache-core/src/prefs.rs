use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PrefsError {
    #[error("Failed to access preferences file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse preferences file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Single-flag preference store for the theme
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Current dark-theme flag; replays the latest value to new subscribers
    fn theme_flag(&self) -> watch::Receiver<bool>;

    async fn set_dark_theme(&self, dark: bool) -> Result<(), PrefsError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Preferences {
    dark_theme: bool,
}

/// Preferences persisted as a small JSON file
pub struct JsonPreferences {
    path: PathBuf,
    flag: watch::Sender<bool>,
}

impl JsonPreferences {
    /// Load preferences from `path`; a missing file means light theme
    pub fn open(path: PathBuf) -> Result<Self, PrefsError> {
        let prefs = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str::<Preferences>(&contents)?
        } else {
            Preferences::default()
        };
        let (flag, _) = watch::channel(prefs.dark_theme);
        Ok(Self { path, flag })
    }

    fn save(&self, prefs: &Preferences) -> Result<(), PrefsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(prefs)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for JsonPreferences {
    fn theme_flag(&self) -> watch::Receiver<bool> {
        self.flag.subscribe()
    }

    async fn set_dark_theme(&self, dark: bool) -> Result<(), PrefsError> {
        self.save(&Preferences { dark_theme: dark })?;
        debug!(dark, "Theme preference saved");
        self.flag.send_replace(dark);
        Ok(())
    }
}
