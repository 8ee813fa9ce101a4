use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::dataset::StorageSettings;
use crate::protocol::GroupMap;

const DEFAULT_DB_PATH: &str = "replaymobile.sql3";
const DEFAULT_MAX_NUMBER_OF_FRAMES: usize = 10;
const SUPPORTED_ANNOTATION_TYPES: &[&str] = &["json"];

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    db_path: Option<String>,
    max_number_of_frames: Option<usize>,
    original: Option<OriginalConfigFile>,
    annotations: Option<AnnotationConfigFile>,
    groups: Option<GroupsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct OriginalConfigFile {
    directory: Option<PathBuf>,
    extension: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotationConfigFile {
    directory: Option<PathBuf>,
    extension: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroupsConfigFile {
    high_level: [String; 3],
    low_level: [String; 3],
}

/// Settings of a [`crate::VerificationDatabase`].
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationConfig {
    pub db_path: String,
    /// Frames sampled from each video. Values of 240 or more keep every frame.
    pub max_number_of_frames: usize,
    pub storage: StorageSettings,
    pub groups: GroupMap,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            max_number_of_frames: DEFAULT_MAX_NUMBER_OF_FRAMES,
            storage: StorageSettings::default(),
            groups: GroupMap::default(),
        }
    }
}

impl VerificationConfig {
    /// Loads `REPLAYMOBILE_CONFIG` (JSON, or TOML for `.toml` paths) if set, then
    /// applies environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("REPLAYMOBILE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> Result<Self> {
        let defaults = StorageSettings::default();
        let storage = StorageSettings {
            original_directory: file.original.as_ref().and_then(|o| o.directory.clone()),
            original_extension: file.original.and_then(|o| o.extension),
            annotation_directory: file
                .annotations
                .as_ref()
                .and_then(|a| a.directory.clone()),
            annotation_extension: file
                .annotations
                .as_ref()
                .and_then(|a| a.extension.clone())
                .unwrap_or(defaults.annotation_extension),
            annotation_type: file
                .annotations
                .and_then(|a| a.kind)
                .unwrap_or(defaults.annotation_type),
        };
        let groups = match file.groups {
            Some(groups) => GroupMap::new(groups.high_level, groups.low_level)?,
            None => GroupMap::default(),
        };
        Ok(Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            max_number_of_frames: file
                .max_number_of_frames
                .unwrap_or(DEFAULT_MAX_NUMBER_OF_FRAMES),
            storage,
            groups,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("REPLAYMOBILE_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(frames) = std::env::var("REPLAYMOBILE_MAX_FRAMES") {
            self.max_number_of_frames = frames.trim().parse().map_err(|_| {
                anyhow!("REPLAYMOBILE_MAX_FRAMES must be a non-negative integer")
            })?;
        }
        if let Ok(dir) = std::env::var("REPLAYMOBILE_ORIGINAL_DIRECTORY") {
            if !dir.trim().is_empty() {
                self.storage.original_directory = Some(PathBuf::from(dir));
            }
        }
        if let Ok(ext) = std::env::var("REPLAYMOBILE_ORIGINAL_EXTENSION") {
            if !ext.trim().is_empty() {
                self.storage.original_extension = Some(ext);
            }
        }
        if let Ok(dir) = std::env::var("REPLAYMOBILE_ANNOTATION_DIRECTORY") {
            if !dir.trim().is_empty() {
                self.storage.annotation_directory = Some(PathBuf::from(dir));
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        // zero means "not configured", like an unset value
        if self.max_number_of_frames == 0 {
            self.max_number_of_frames = DEFAULT_MAX_NUMBER_OF_FRAMES;
        }
        validate_storage(&self.storage)
    }
}

pub(crate) fn validate_storage(storage: &StorageSettings) -> Result<()> {
    if !SUPPORTED_ANNOTATION_TYPES.contains(&storage.annotation_type.as_str()) {
        return Err(anyhow!(
            "unsupported annotation type '{}' (supported: {})",
            storage.annotation_type,
            SUPPORTED_ANNOTATION_TYPES.join(", ")
        ));
    }
    if !storage.annotation_extension.is_empty() && !storage.annotation_extension.starts_with('.')
    {
        return Err(anyhow!(
            "annotation extension must start with '.', got '{}'",
            storage.annotation_extension
        ));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = VerificationConfig::from_file(ConfigFile::default()).unwrap();
        assert_eq!(cfg, VerificationConfig::default());
    }

    #[test]
    fn zero_frames_falls_back_to_default() {
        let mut cfg = VerificationConfig {
            max_number_of_frames: 0,
            ..VerificationConfig::default()
        };
        cfg.validate().unwrap();
        assert_eq!(cfg.max_number_of_frames, DEFAULT_MAX_NUMBER_OF_FRAMES);
    }

    #[test]
    fn rejects_unknown_annotation_type() {
        let storage = StorageSettings {
            annotation_type: "hdf5".to_string(),
            ..StorageSettings::default()
        };
        assert!(validate_storage(&storage).is_err());
    }

    #[test]
    fn parses_toml_group_override() {
        let file: ConfigFile = toml::from_str(
            r#"
            max_number_of_frames = 4

            [groups]
            high_level = ["train", "dev", "test"]
            low_level = ["train", "devel", "test"]
            "#,
        )
        .unwrap();
        let cfg = VerificationConfig::from_file(file).unwrap();
        assert_eq!(cfg.max_number_of_frames, 4);
        assert_eq!(cfg.groups.to_low_level("dev"), Some("devel"));
    }
}
