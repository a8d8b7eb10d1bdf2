//! Persisted theme preference.
//!
//! Preferences live in a small JSON object on disk; the theme is stored under
//! `THEME_STORAGE_KEY`. Other keys of a readable file are preserved on write; an
//! unreadable file is replaced with a warning.
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use market_common::net::THEME_STORAGE_KEY;
use market_common::{Result, Theme};
use serde_json::{Map, Value};

/// Key-value preference file holding the theme.
#[derive(Debug, Clone)]
pub struct ThemeStore {
    path: PathBuf,
}

impl ThemeStore {
    /// Store backed by the file at `path`. The file is created on first write.
    pub fn open(path: impl AsRef<Path>) -> Self {
        ThemeStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Saved theme; light unless `"dark"` was stored.
    pub fn load(&self) -> Theme {
        match self.read_map() {
            Ok(map) => Theme::from_stored(map.get(THEME_STORAGE_KEY).and_then(Value::as_str)),
            Err(e) => {
                warn!("Ignoring unreadable preferences {}: {}", self.path.display(), e);
                Theme::Light
            }
        }
    }

    /// Persist `theme`.
    pub fn set(&self, theme: Theme) -> Result<()> {
        let mut map = self.read_map().unwrap_or_else(|e| {
            warn!(
                "Replacing unreadable preferences {}; other keys are lost: {}",
                self.path.display(),
                e
            );
            Map::new()
        });
        map.insert(String::from(THEME_STORAGE_KEY), Value::String(theme.to_string()));
        fs::write(&self.path, serde_json::to_vec_pretty(&Value::Object(map))?)?;
        debug!("Saved theme {} to {}", theme, self.path.display());
        Ok(())
    }

    /// Flip and persist the theme; returns the new value.
    pub fn toggle(&self) -> Result<Theme> {
        let next = self.load().toggled();
        self.set(next)?;
        Ok(next)
    }

    fn read_map(&self) -> Result<Map<String, Value>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice::<Value>(&bytes)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_means_light() {
        let dir = tempdir().unwrap();
        let store = ThemeStore::open(dir.path().join("prefs.json"));
        assert_eq!(store.load(), Theme::Light);
    }

    #[test]
    fn toggle_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        assert_eq!(ThemeStore::open(&path).toggle().unwrap(), Theme::Dark);
        assert_eq!(ThemeStore::open(&path).load(), Theme::Dark);
        assert_eq!(ThemeStore::open(&path).toggle().unwrap(), Theme::Light);

        let raw: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw[THEME_STORAGE_KEY], "light");
    }

    #[test]
    fn unknown_or_corrupt_values_fall_back_to_light() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        fs::write(&path, r#"{"theme": "solarized"}"#).unwrap();
        assert_eq!(ThemeStore::open(&path).load(), Theme::Light);

        fs::write(&path, "not json").unwrap();
        assert_eq!(ThemeStore::open(&path).load(), Theme::Light);
    }

    #[test]
    fn other_keys_survive_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, r#"{"layout": "grid"}"#).unwrap();

        ThemeStore::open(&path).set(Theme::Dark).unwrap();
        let raw: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["layout"], "grid");
        assert_eq!(raw["theme"], "dark");
    }

    #[test]
    fn set_recovers_a_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "{ half written").unwrap();

        let store = ThemeStore::open(&path);
        store.set(Theme::Dark).unwrap();
        assert_eq!(store.load(), Theme::Dark);
        let raw: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw.as_object().unwrap().len(), 1);
    }
}
