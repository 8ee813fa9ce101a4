//! Capability interface of the low-level dataset.
//!
//! The verification layer never talks to a concrete storage engine. Anything that
//! can answer [`LowLevelDatabase::objects`] with ordered [`VideoRecord`]s can sit
//! underneath it: the bundled SQLite backend, or an in-memory fixture in tests.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Low-level classification of a video, also used as the class filter of a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Class {
    Enroll,
    Real,
    Attack,
}

impl Class {
    pub const ALL: [Class; 3] = [Class::Enroll, Class::Real, Class::Attack];

    pub fn as_str(self) -> &'static str {
        match self {
            Class::Enroll => "enroll",
            Class::Real => "real",
            Class::Attack => "attack",
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Class {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Class::ALL
            .into_iter()
            .find(|class| class.as_str() == s)
            .ok_or_else(|| anyhow!("unknown video class '{}'", s))
    }
}

/// Presentation-attack metadata of an attack video.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttackInfo {
    pub attack_device: String,
    pub attack_support: String,
}

/// Face bounding box of one frame, as `(y, x)` corner coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct Annotation {
    pub topleft: (f64, f64),
    pub bottomright: (f64, f64),
}

/// Per-video annotations keyed by the decimal frame number.
pub type Annotations = BTreeMap<String, Annotation>;

/// Entry of the low-level protocol catalogue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LowLevelProtocol {
    pub name: String,
}

/// Extra query filters handed to the low-level dataset untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filters(BTreeMap<String, Vec<String>>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, values: &[&str]) -> Self {
        self.insert(key, values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn insert(&mut self, key: &str, values: Vec<String>) {
        self.0.insert(key.to_string(), values);
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A query expressed entirely in the low-level vocabulary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LowLevelQuery {
    pub groups: Vec<String>,
    pub protocol: String,
    pub classes: Vec<Class>,
    /// `None` selects every client.
    pub clients: Option<Vec<String>>,
    pub filters: Filters,
}

/// Failure of a whole-video decode.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The decoder failed in a way that may succeed when attempted again.
    #[error("transient decode failure: {0}")]
    Transient(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Where raw videos and annotation files live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageSettings {
    pub original_directory: Option<PathBuf>,
    pub original_extension: Option<String>,
    pub annotation_directory: Option<PathBuf>,
    pub annotation_extension: String,
    pub annotation_type: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            original_directory: None,
            original_extension: None,
            annotation_directory: None,
            annotation_extension: ".json".to_string(),
            annotation_type: "json".to_string(),
        }
    }
}

/// One physical recording as served by the low-level dataset.
pub trait VideoRecord {
    /// Decoded frame or loaded resource type.
    type Frame;

    fn id(&self) -> i64;

    /// Storage path, relative and without extension.
    fn path(&self) -> &str;

    fn client_id(&self) -> &str;

    fn class(&self) -> Class;

    /// Enrolment and genuine-access videos are both real.
    fn is_real(&self) -> bool {
        self.class() != Class::Attack
    }

    /// Attack metadata. Fails for videos that are not attacks.
    fn attack(&self) -> Result<AttackInfo>;

    fn annotations(&self) -> Result<Annotations>;

    /// Decodes every frame of the video.
    fn load_video(
        &self,
        directory: Option<&Path>,
        extension: Option<&str>,
    ) -> std::result::Result<Vec<Self::Frame>, DecodeError>;

    /// Loads a single pre-extracted resource from `path`.
    fn load_resource(&self, path: &Path) -> Result<Self::Frame>;
}

/// Query surface of the low-level dataset.
pub trait LowLevelDatabase {
    type Record: VideoRecord;

    /// Returns matching videos in a stable order.
    fn objects(&self, query: &LowLevelQuery) -> Result<Vec<Self::Record>>;

    fn clients(&self) -> Result<Vec<String>>;

    fn has_client_id(&self, id: &str) -> Result<bool>;

    fn protocols(&self) -> Result<Vec<LowLevelProtocol>>;

    /// Low-level group names known to the dataset.
    fn groups(&self) -> Result<Vec<String>>;

    /// Applies new storage locations to subsequently returned records.
    fn configure(&mut self, settings: &StorageSettings) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_parses_its_own_names() {
        for class in Class::ALL {
            assert_eq!(class.as_str().parse::<Class>().unwrap(), class);
        }
        assert!("probe".parse::<Class>().is_err());
    }

    #[test]
    fn filters_keep_insertion_values() {
        let filters = Filters::new().with("light", &["lighton"]);
        assert_eq!(filters.get("light"), Some(&["lighton".to_string()][..]));
        assert!(filters.get("device").is_none());
        assert!(!filters.is_empty());
    }
}
