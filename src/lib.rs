//! Replay-Mobile verification protocols.
//!
//! This crate presents the Replay-Mobile face presentation-attack dataset as a
//! face verification database. The low-level dataset stores whole videos grouped
//! by `train/devel/test` and classified as `enroll/real/attack`; this layer turns
//! them into enroll/probe samples of evenly spaced frames under `-licit` and
//! `-spoof` protocols.
//!
//! # Module Structure
//!
//! - `sampling`: deterministic choice of frame indices per video
//! - `frame`: `SampledFrame`, one frame of a video as an independent sample
//! - `protocol`: licit/spoof protocol algebra, group and purpose translation
//! - `database`: `VerificationDatabase`, the query facade
//! - `dataset`: capability interface every low-level backend implements
//! - `sqlite`: SQLite-backed low-level dataset
//! - `config`: file and environment configuration

pub mod config;
pub mod database;
pub mod dataset;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod sampling;
pub mod sqlite;

pub use config::VerificationConfig;
pub use database::{ObjectsQuery, VerificationDatabase};
pub use dataset::{
    Annotation, Annotations, AttackInfo, Class, DecodeError, Filters, LowLevelDatabase,
    LowLevelProtocol, LowLevelQuery, StorageSettings, VideoRecord,
};
pub use error::{FrameError, QueryError};
pub use frame::{FrameId, FrameLoad, SampledFrame, DECODE_ATTEMPTS, NATIVE_VIDEO_EXTENSION};
pub use protocol::{GroupMap, HighLevelProtocol, ProtocolVariant, Purpose, DEFAULT_PROTOCOL};
pub use sampling::{selected_indices, VIDEO_FRAME_COUNT};
pub use sqlite::{NewVideo, NoDecoder, SqliteDataset, SqliteVideo, VideoDecoder};
