//! Verification-protocol view over the low-level dataset.
//!
//! [`VerificationDatabase`] exposes enroll/probe semantics, `-licit`/`-spoof`
//! protocols and one sample per selected frame on top of any
//! [`LowLevelDatabase`].

use anyhow::anyhow;
use std::path::PathBuf;
use std::rc::Rc;

use crate::config::{validate_storage, VerificationConfig};
use crate::dataset::{Annotation, Filters, LowLevelDatabase, StorageSettings, VideoRecord};
use crate::error::{FrameError, QueryError};
use crate::frame::SampledFrame;
use crate::protocol::{
    self, check_parameter, check_parameters, parse_purposes, HighLevelProtocol, DEFAULT_PROTOCOL,
    NO_PROTOCOL,
};
use crate::sampling::{selected_indices, VIDEO_FRAME_COUNT};

/// Filters of [`VerificationDatabase::objects`], all in the high-level vocabulary.
///
/// Unset fields select everything, except `protocol` which defaults to
/// `grandtest-licit`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectsQuery {
    pub groups: Option<Vec<String>>,
    pub protocol: Option<String>,
    pub purposes: Option<Vec<String>>,
    pub model_ids: Option<Vec<String>>,
    pub filters: Filters,
}

impl ObjectsQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn protocol(mut self, protocol: &str) -> Self {
        self.protocol = Some(protocol.to_string());
        self
    }

    pub fn groups(mut self, groups: &[&str]) -> Self {
        self.groups = Some(to_owned(groups));
        self
    }

    pub fn purposes(mut self, purposes: &[&str]) -> Self {
        self.purposes = Some(to_owned(purposes));
        self
    }

    pub fn model_ids(mut self, model_ids: &[&str]) -> Self {
        self.model_ids = Some(to_owned(model_ids));
        self
    }

    pub fn filter(mut self, key: &str, values: &[&str]) -> Self {
        self.filters.insert(key, to_owned(values));
        self
    }
}

fn to_owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub struct VerificationDatabase<D> {
    db: D,
    config: VerificationConfig,
    indices: Vec<usize>,
}

impl<D: LowLevelDatabase> VerificationDatabase<D> {
    /// Wraps `db`, pushing the configured storage settings down to it.
    pub fn new(mut db: D, config: VerificationConfig) -> anyhow::Result<Self> {
        validate_storage(&config.storage)?;
        db.configure(&config.storage)?;
        let desired = i64::try_from(config.max_number_of_frames)
            .map_err(|_| anyhow!("max_number_of_frames out of range"))?;
        let indices = selected_indices(VIDEO_FRAME_COUNT, Some(desired));
        Ok(Self {
            db,
            config,
            indices,
        })
    }

    /// Consumes the facade and returns it with new storage settings applied.
    pub fn reconfigure(mut self, storage: StorageSettings) -> anyhow::Result<Self> {
        validate_storage(&storage)?;
        self.db.configure(&storage)?;
        self.config.storage = storage;
        Ok(self)
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    pub fn storage(&self) -> &StorageSettings {
        &self.config.storage
    }

    /// Frame numbers sampled from every video.
    pub fn frame_indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn low_level(&self) -> &D {
        &self.db
    }

    /// Every low-level protocol as `-licit` names followed by `-spoof` names.
    pub fn protocol_names(&self) -> Result<Vec<String>, QueryError> {
        Ok(protocol::protocol_names(&self.db.protocols()?))
    }

    /// High-level names of the groups known to the low-level dataset.
    pub fn groups(&self) -> Result<Vec<String>, QueryError> {
        let map = &self.config.groups;
        self.db
            .groups()?
            .iter()
            .map(|low| {
                map.to_high_level(low).map(str::to_string).ok_or_else(|| {
                    QueryError::Backend(anyhow!("low-level group '{}' has no high-level name", low))
                })
            })
            .collect()
    }

    pub fn clients(&self) -> Result<Vec<String>, QueryError> {
        Ok(self.db.clients()?)
    }

    pub fn has_client_id(&self, id: &str) -> Result<bool, QueryError> {
        Ok(self.db.has_client_id(id)?)
    }

    /// Sorted, distinct client ids of the enrolment samples matching `query`.
    pub fn model_ids_with_protocol(&self, query: &ObjectsQuery) -> Result<Vec<String>, QueryError> {
        let enroll = ObjectsQuery {
            purposes: Some(vec!["enroll".to_string()]),
            ..query.clone()
        };
        let mut ids: Vec<String> = self
            .objects(&enroll)?
            .iter()
            .map(|f| f.client_id().to_string())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Runs `query` and returns one sample per selected frame of every matching video.
    ///
    /// Samples are ordered by video, in low-level result order, then by frame number.
    pub fn objects(
        &self,
        query: &ObjectsQuery,
    ) -> Result<Vec<SampledFrame<D::Record>>, QueryError> {
        let requested = query.protocol.as_deref().filter(|p| *p != NO_PROTOCOL);
        let name = check_parameter(
            "protocol",
            requested,
            &self.protocol_names()?,
            DEFAULT_PROTOCOL,
        )?;
        let high_level = HighLevelProtocol::parse(&name).ok_or_else(|| {
            QueryError::Backend(anyhow!("protocol '{}' has no licit/spoof suffix", name))
        })?;

        let groups = check_parameters("group", query.groups.as_deref(), &self.groups()?)?;
        let purposes = parse_purposes(query.purposes.as_deref())?;
        let low_level_groups = groups
            .iter()
            .filter_map(|g| self.config.groups.to_low_level(g))
            .map(str::to_string)
            .collect();

        let low_level_query = protocol::translate(
            &high_level,
            low_level_groups,
            &purposes,
            query.model_ids.clone(),
            query.filters.clone(),
        )?;
        let records = self.db.objects(&low_level_query)?;

        let mut frames = Vec::with_capacity(records.len() * self.indices.len());
        for record in records {
            let record = Rc::new(record);
            let attack_client = if record.is_real() {
                None
            } else {
                // attack_support is deliberately not part of the id
                Some(format!("attack/{}", record.attack()?.attack_device))
            };
            for &index in &self.indices {
                let frame = SampledFrame::new(Rc::clone(&record), index);
                frames.push(match &attack_client {
                    Some(client) => frame.with_client_id(client.clone()),
                    None => frame,
                });
            }
        }
        log::debug!(
            "{} returned {} samples for groups {:?}",
            high_level,
            frames.len(),
            groups
        );
        Ok(frames)
    }

    /// Annotation of a sample returned by [`VerificationDatabase::objects`].
    pub fn annotations(&self, frame: &SampledFrame<D::Record>) -> Result<Annotation, FrameError> {
        frame.annotation()
    }

    /// Paths of the source videos of `frames`, under the configured original
    /// directory and extension.
    pub fn original_file_paths(&self, frames: &[SampledFrame<D::Record>]) -> Vec<PathBuf> {
        let storage = &self.config.storage;
        frames
            .iter()
            .map(|frame| {
                let file_name = format!(
                    "{}{}",
                    frame.original_path(),
                    storage.original_extension.as_deref().unwrap_or("")
                );
                match &storage.original_directory {
                    Some(dir) => dir.join(file_name),
                    None => PathBuf::from(file_name),
                }
            })
            .collect()
    }
}
