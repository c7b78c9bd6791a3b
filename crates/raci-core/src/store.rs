use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{RaciError, RaciState, Result};

const EXTENSION: &str = ".raci.json";

// --- AI Settings ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AiSettings {
    pub provider: String,
    pub api_key: String,
    pub model: String,
    /// Inference endpoint taking `{"prompt": ...}`. Preferred over `provider` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: String::new(),
            api_key: String::new(),
            model: String::new(),
            endpoint: None,
            timeout_secs: 60,
            max_retries: 1,
        }
    }
}

pub fn ai_configured(settings: &AiSettings) -> bool {
    if settings.endpoint.as_deref().is_some_and(|e| !e.trim().is_empty()) {
        return true;
    }
    !settings.provider.is_empty()
        && !settings.model.is_empty()
        && (settings.provider == "ollama" || !settings.api_key.is_empty())
}

// --- Storage ---

/// Saved matrices under one directory, one `<name>.raci.json` file each.
#[derive(Debug, Clone)]
pub struct MatrixStore {
    root: PathBuf,
}

impl MatrixStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.raci/`
    pub fn default_location() -> Self {
        Self::new(
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".raci"),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(RaciError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(format!("{}{}", name, EXTENSION)))
    }

    /// All matrix names, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }
        let mut names: Vec<String> = fs::read_dir(&self.root)?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().to_string();
                name.strip_suffix(EXTENSION).map(|n| n.to_string())
            })
            .filter(|n| !n.starts_with('.'))
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.exists()).unwrap_or(false)
    }

    pub fn read_raw(&self, name: &str) -> Result<String> {
        Ok(fs::read_to_string(self.path_for(name)?)?)
    }

    pub fn read(&self, name: &str) -> Result<RaciState> {
        let raw = self.read_raw(name)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Atomic write: temp file, then rename over the target.
    pub fn write(&self, name: &str, state: &RaciState) -> Result<()> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.root)?;
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.root.join(format!(".{}{}.tmp", name, EXTENSION));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        debug!(matrix = name, "saved matrix");
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn settings_path(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    /// Defaults when the file is missing or unreadable.
    pub fn read_settings(&self) -> AiSettings {
        let path = self.settings_path();
        if !path.exists() {
            return AiSettings::default();
        }
        match fs::read_to_string(&path)
            .map_err(RaciError::from)
            .and_then(|s| serde_json::from_str(&s).map_err(RaciError::from))
        {
            Ok(settings) => settings,
            Err(e) => {
                warn!("ignoring unreadable settings at {}: {}", path.display(), e);
                AiSettings::default()
            }
        }
    }

    pub fn write_settings(&self, settings: &AiSettings) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(self.settings_path(), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Role, Task};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn state() -> RaciState {
        RaciState::new(
            "Onboarding",
            "",
            vec![Role::new("role-1", "HR")],
            vec![Task::new("task-1", "Paperwork")],
        )
    }

    #[test]
    fn write_read_list_delete() {
        let dir = tempdir().unwrap();
        let store = MatrixStore::new(dir.path().join("nested"));
        assert!(store.list().unwrap().is_empty());

        store.write("onboarding", &state()).unwrap();
        store.write("alpha", &state()).unwrap();
        assert_eq!(store.list().unwrap(), vec!["alpha", "onboarding"]);
        assert_eq!(store.read("onboarding").unwrap(), state());

        store.delete("alpha").unwrap();
        store.delete("alpha").unwrap();
        assert_eq!(store.list().unwrap(), vec!["onboarding"]);
    }

    #[test]
    fn rejects_path_like_names() {
        let dir = tempdir().unwrap();
        let store = MatrixStore::new(dir.path());
        assert!(matches!(
            store.write("../escape", &state()),
            Err(RaciError::InvalidName(_))
        ));
        assert!(!store.exists(""));
    }

    #[test]
    fn settings_default_and_round_trip() {
        let dir = tempdir().unwrap();
        let store = MatrixStore::new(dir.path());
        let defaults = store.read_settings();
        assert_eq!(defaults.timeout_secs, 60);
        assert_eq!(defaults.max_retries, 1);
        assert!(!ai_configured(&defaults));

        let settings = AiSettings {
            provider: "ollama".into(),
            model: "llama3.2".into(),
            ..Default::default()
        };
        store.write_settings(&settings).unwrap();
        let read = store.read_settings();
        assert_eq!(read, settings);
        assert!(ai_configured(&read));
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"endpoint":"https://raci.example/api/infer"}"#,
        )
        .unwrap();
        let settings = MatrixStore::new(dir.path()).read_settings();
        assert_eq!(settings.timeout_secs, 60);
        assert!(ai_configured(&settings));
    }
}
