//! Sampled frames.
//!
//! A [`SampledFrame`] turns one frame of a low-level video into an independent
//! sample with its own identity, storage path, client and annotation.
//!
//! - `FrameId`: `(video id, frame number)`, unique within a query result.
//! - `FrameLoad`: outcome of a frame load; decode exhaustion is explicit.
//!
//! Frames are built fresh by every query and are never persisted.

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::dataset::{Annotation, DecodeError, VideoRecord};
use crate::error::FrameError;

/// Maximum number of whole-video decodes attempted by [`SampledFrame::load`].
pub const DECODE_ATTEMPTS: u32 = 100;

/// Extension of the native multi-frame container.
pub const NATIVE_VIDEO_EXTENSION: &str = ".mov";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId {
    pub video_id: i64,
    pub frame_number: usize,
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.video_id, self.frame_number)
    }
}

/// Result of loading the content of a sampled frame.
#[derive(Debug, PartialEq)]
pub enum FrameLoad<F> {
    Loaded(F),
    /// Every decode attempt failed transiently.
    Exhausted { attempts: u32 },
}

impl<F> FrameLoad<F> {
    pub fn into_option(self) -> Option<F> {
        match self {
            FrameLoad::Loaded(frame) => Some(frame),
            FrameLoad::Exhausted { .. } => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, FrameLoad::Exhausted { .. })
    }
}

/// One evenly sampled frame of a low-level video.
pub struct SampledFrame<R> {
    parent: Rc<R>,
    frame_number: usize,
    path: String,
    client_id: String,
}

impl<R: VideoRecord> SampledFrame<R> {
    /// Wraps `frame_number` of `parent`. The frame number is not range checked.
    pub fn new(parent: Rc<R>, frame_number: usize) -> Self {
        let path = format!("{}_{:03}", parent.path(), frame_number);
        let client_id = parent.client_id().to_string();
        Self {
            parent,
            frame_number,
            path,
            client_id,
        }
    }

    pub(crate) fn with_client_id(mut self, client_id: String) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn id(&self) -> FrameId {
        FrameId {
            video_id: self.parent.id(),
            frame_number: self.frame_number,
        }
    }

    pub fn frame_number(&self) -> usize {
        self.frame_number
    }

    /// Per-frame path: the parent path suffixed with the zero-padded frame number.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path of the video this frame was sampled from.
    pub fn original_path(&self) -> &str {
        self.parent.path()
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn parent(&self) -> &R {
        &self.parent
    }

    /// `directory/<path><extension>`.
    pub fn make_path(&self, directory: Option<&Path>, extension: Option<&str>) -> PathBuf {
        let file_name = format!("{}{}", self.path, extension.unwrap_or(""));
        match directory {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }

    /// Loads the frame content.
    ///
    /// For the native container (or no extension) the whole video is decoded and
    /// indexed at this frame. Transient decode failures are retried up to
    /// [`DECODE_ATTEMPTS`] times with no delay. Any other extension names a
    /// pre-extracted per-frame resource that is loaded once from
    /// [`SampledFrame::make_path`].
    pub fn load(
        &self,
        directory: Option<&Path>,
        extension: Option<&str>,
    ) -> Result<FrameLoad<R::Frame>, FrameError> {
        if !is_native_video(extension) {
            let path = self.make_path(directory, extension);
            let frame = self.parent.load_resource(&path)?;
            return Ok(FrameLoad::Loaded(frame));
        }

        for attempt in 1..=DECODE_ATTEMPTS {
            match self.parent.load_video(directory, extension) {
                Ok(frames) => return self.pick(frames).map(FrameLoad::Loaded),
                Err(DecodeError::Transient(reason)) => {
                    log::debug!(
                        "decode of {} failed (attempt {}/{}): {}",
                        self.parent.path(),
                        attempt,
                        DECODE_ATTEMPTS,
                        reason
                    );
                }
                Err(DecodeError::Other(err)) => return Err(FrameError::Backend(err)),
            }
        }

        // exhaustion is reported as FrameLoad::Exhausted, not as an error
        log::warn!(
            "giving up on frame {} after {} failed decodes of {}",
            self.id(),
            DECODE_ATTEMPTS,
            self.parent.path()
        );
        Ok(FrameLoad::Exhausted {
            attempts: DECODE_ATTEMPTS,
        })
    }

    fn pick(&self, frames: Vec<R::Frame>) -> Result<R::Frame, FrameError> {
        let decoded = frames.len();
        frames
            .into_iter()
            .nth(self.frame_number)
            .ok_or(FrameError::FrameOutOfRange {
                frame: self.id(),
                decoded,
            })
    }

    /// Annotation of this frame. A missing entry is an error, never a default.
    pub fn annotation(&self) -> Result<Annotation, FrameError> {
        let key = self.frame_number.to_string();
        let mut annotations = self.parent.annotations()?;
        annotations
            .remove(&key)
            .ok_or_else(|| FrameError::MissingAnnotation {
                frame: self.id(),
                key,
            })
    }
}

impl<R> Clone for SampledFrame<R> {
    fn clone(&self) -> Self {
        Self {
            parent: Rc::clone(&self.parent),
            frame_number: self.frame_number,
            path: self.path.clone(),
            client_id: self.client_id.clone(),
        }
    }
}

impl<R: VideoRecord> fmt::Debug for SampledFrame<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampledFrame")
            .field("id", &self.id())
            .field("path", &self.path)
            .field("client_id", &self.client_id)
            .finish()
    }
}

fn is_native_video(extension: Option<&str>) -> bool {
    match extension {
        None => true,
        Some(ext) => ext == NATIVE_VIDEO_EXTENSION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Annotations, AttackInfo, Class};
    use anyhow::{anyhow, Result};
    use std::cell::Cell;

    struct FlakyVideo {
        failures_left: Cell<u32>,
        calls: Cell<u32>,
        annotations: Annotations,
    }

    impl FlakyVideo {
        fn failing(times: u32) -> Self {
            let mut annotations = Annotations::new();
            annotations.insert(
                "12".to_string(),
                Annotation {
                    topleft: (10.0, 20.0),
                    bottomright: (110.0, 120.0),
                },
            );
            Self {
                failures_left: Cell::new(times),
                calls: Cell::new(0),
                annotations,
            }
        }
    }

    impl VideoRecord for FlakyVideo {
        type Frame = String;

        fn id(&self) -> i64 {
            7
        }

        fn path(&self) -> &str {
            "real/client001_session01"
        }

        fn client_id(&self) -> &str {
            "1"
        }

        fn class(&self) -> Class {
            Class::Real
        }

        fn attack(&self) -> Result<AttackInfo> {
            Err(anyhow!("not an attack"))
        }

        fn annotations(&self) -> Result<Annotations> {
            Ok(self.annotations.clone())
        }

        fn load_video(
            &self,
            _directory: Option<&Path>,
            _extension: Option<&str>,
        ) -> Result<Vec<String>, DecodeError> {
            self.calls.set(self.calls.get() + 1);
            if self.failures_left.get() > 0 {
                self.failures_left.set(self.failures_left.get() - 1);
                return Err(DecodeError::Transient("decoder hiccup".to_string()));
            }
            Ok((0..240).map(|i| format!("frame-{}", i)).collect())
        }

        fn load_resource(&self, path: &Path) -> Result<String> {
            Ok(format!("resource:{}", path.display()))
        }
    }

    #[test]
    fn derives_identity_and_path_from_parent() {
        let frame = SampledFrame::new(Rc::new(FlakyVideo::failing(0)), 7);
        assert_eq!(frame.path(), "real/client001_session01_007");
        assert_eq!(frame.original_path(), "real/client001_session01");
        assert_eq!(frame.id().to_string(), "7_7");
        assert_eq!(frame.client_id(), "1");
    }

    #[test]
    fn retries_transient_decode_failures() {
        let video = Rc::new(FlakyVideo::failing(3));
        let frame = SampledFrame::new(Rc::clone(&video), 12);
        let loaded = frame.load(None, Some(".mov")).unwrap();
        assert_eq!(loaded, FrameLoad::Loaded("frame-12".to_string()));
        assert_eq!(video.calls.get(), 4);
    }

    #[test]
    fn exhaustion_is_reported_after_fixed_attempts() {
        let video = Rc::new(FlakyVideo::failing(u32::MAX));
        let frame = SampledFrame::new(Rc::clone(&video), 12);
        let loaded = frame.load(None, None).unwrap();
        assert!(loaded.is_exhausted());
        assert_eq!(video.calls.get(), DECODE_ATTEMPTS);
    }

    #[test]
    fn last_attempt_can_still_succeed() {
        let video = Rc::new(FlakyVideo::failing(DECODE_ATTEMPTS - 1));
        let frame = SampledFrame::new(video, 0);
        let loaded = frame.load(None, None).unwrap();
        assert_eq!(loaded.into_option(), Some("frame-0".to_string()));
    }

    #[test]
    fn other_extensions_load_the_frame_resource_once() {
        let video = Rc::new(FlakyVideo::failing(5));
        let frame = SampledFrame::new(Rc::clone(&video), 36);
        let loaded = frame.load(Some(Path::new("/data/frames")), Some(".png")).unwrap();
        assert_eq!(
            loaded.into_option(),
            Some("resource:/data/frames/real/client001_session01_036.png".to_string())
        );
        assert_eq!(video.calls.get(), 0);
    }

    #[test]
    fn frame_beyond_decoded_video_is_an_error() {
        let frame = SampledFrame::new(Rc::new(FlakyVideo::failing(0)), 500);
        let err = frame.load(None, None).unwrap_err();
        assert!(matches!(
            err,
            FrameError::FrameOutOfRange { decoded: 240, .. }
        ));
    }

    #[test]
    fn annotation_lookup_has_no_default() {
        let video = Rc::new(FlakyVideo::failing(0));
        let annotated = SampledFrame::new(Rc::clone(&video), 12);
        assert_eq!(annotated.annotation().unwrap().topleft, (10.0, 20.0));

        let missing = SampledFrame::new(video, 13);
        let err = missing.annotation().unwrap_err();
        assert!(matches!(err, FrameError::MissingAnnotation { ref key, .. } if key == "13"));
    }
}
