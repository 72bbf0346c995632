//! Media capture adapter.
//!
//! Acquires the local camera and microphone through a [`MediaDevices`]
//! implementation and owns the resulting [`LocalStream`]. Peer links receive
//! clones of the stream handle (read-only attachment); only [`MediaCapture`]
//! stops tracks, and it does so exactly once per acquisition, either through
//! [`MediaCapture::release`] or on drop.

use crate::errors::SessionError;
use crate::observability::metrics;
use async_trait::async_trait;
use common::types::StreamId;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Kind of a captured track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Microphone.
    Audio,
    /// Camera.
    Video,
}

impl TrackKind {
    /// Returns the track kind as a string for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

/// Device acquisition failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The user or platform refused access.
    #[error("Permission denied")]
    PermissionDenied,

    /// No camera or microphone is present.
    #[error("No capture device found")]
    NotFound,

    /// The device exists but is held by another process.
    #[error("Device busy: {0}")]
    Busy(String),

    /// The platform returned an empty stream.
    #[error("Device returned no tracks")]
    NoTracks,
}

/// One captured track.
///
/// Implementations wrap a platform handle. `stop` releases the device and is
/// only ever called by [`MediaCapture`].
pub trait MediaTrack: Send + Sync + fmt::Debug {
    /// Track kind.
    fn kind(&self) -> TrackKind;

    /// Enable or disable the track without releasing the device.
    fn set_enabled(&self, enabled: bool);

    /// Whether the track is currently enabled.
    fn is_enabled(&self) -> bool;

    /// Stop the track and free the device handle.
    fn stop(&self);
}

/// Which devices to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    /// Request the microphone.
    pub audio: bool,
    /// Request the camera.
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// Platform media device access.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Open the requested devices. May suspend while the user decides on a
    /// permission prompt.
    async fn open(&self, constraints: MediaConstraints)
        -> Result<Vec<Arc<dyn MediaTrack>>, DeviceError>;
}

/// Handle to the acquired local stream.
///
/// Cloning shares the same tracks; clones never stop them.
#[derive(Debug, Clone)]
pub struct LocalStream {
    id: StreamId,
    tracks: Arc<[Arc<dyn MediaTrack>]>,
}

impl LocalStream {
    fn new(tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self {
            id: StreamId::new(),
            tracks: tracks.into(),
        }
    }

    /// Stream ID.
    #[must_use]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// All tracks of the stream.
    #[must_use]
    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    /// Whether the stream carries a track of `kind`.
    #[must_use]
    pub fn has(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind() == kind)
    }

    /// Enabled flag of the first track of `kind`, if any.
    #[must_use]
    pub fn is_enabled(&self, kind: TrackKind) -> Option<bool> {
        self.tracks
            .iter()
            .find(|t| t.kind() == kind)
            .map(|t| t.is_enabled())
    }
}

/// Owner of the local capture.
pub struct MediaCapture {
    devices: Arc<dyn MediaDevices>,
    constraints: MediaConstraints,
    stream: Option<LocalStream>,
}

impl MediaCapture {
    /// Create an adapter over `devices` requesting camera and microphone.
    #[must_use]
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            constraints: MediaConstraints::default(),
            stream: None,
        }
    }

    /// Override the requested devices.
    #[must_use]
    pub fn with_constraints(mut self, constraints: MediaConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Acquire the local stream.
    ///
    /// Returns the existing stream when already acquired, so a second call
    /// never opens the devices twice.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::DeviceUnavailable` on denial, missing hardware,
    /// or an empty stream.
    #[instrument(skip_all, name = "ls.media.acquire")]
    pub async fn acquire(&mut self) -> Result<LocalStream, SessionError> {
        if let Some(stream) = &self.stream {
            debug!(target: "ls.media", stream_id = %stream.id(), "Stream already acquired");
            return Ok(stream.clone());
        }

        let tracks = self.devices.open(self.constraints).await.map_err(|e| {
            warn!(target: "ls.media", error = %e, "Media acquisition failed");
            SessionError::DeviceUnavailable(e)
        })?;

        if tracks.is_empty() {
            warn!(target: "ls.media", "Media acquisition returned no tracks");
            return Err(SessionError::DeviceUnavailable(DeviceError::NoTracks));
        }

        let stream = LocalStream::new(tracks);
        info!(
            target: "ls.media",
            stream_id = %stream.id(),
            audio = stream.has(TrackKind::Audio),
            video = stream.has(TrackKind::Video),
            "Local stream acquired"
        );
        self.stream = Some(stream.clone());
        Ok(stream)
    }

    /// Enable or disable the microphone.
    ///
    /// Returns `true` only when the flag actually changed.
    pub fn toggle_audio(&self, enabled: bool) -> bool {
        self.toggle(TrackKind::Audio, enabled)
    }

    /// Enable or disable the camera.
    ///
    /// Returns `true` only when the flag actually changed.
    pub fn toggle_video(&self, enabled: bool) -> bool {
        self.toggle(TrackKind::Video, enabled)
    }

    fn toggle(&self, kind: TrackKind, enabled: bool) -> bool {
        let Some(stream) = &self.stream else {
            debug!(target: "ls.media", kind = kind.as_str(), "Toggle ignored, no stream");
            return false;
        };

        let mut changed = false;
        for track in stream.tracks().iter().filter(|t| t.kind() == kind) {
            if track.is_enabled() != enabled {
                track.set_enabled(enabled);
                changed = true;
            }
        }

        if changed {
            debug!(target: "ls.media", kind = kind.as_str(), enabled, "Track toggled");
        }
        changed
    }

    /// Current enabled flag for `kind`, `None` without a stream or track.
    #[must_use]
    pub fn is_enabled(&self, kind: TrackKind) -> Option<bool> {
        self.stream.as_ref().and_then(|s| s.is_enabled(kind))
    }

    /// Whether a stream is currently held.
    #[must_use]
    pub fn is_acquired(&self) -> bool {
        self.stream.is_some()
    }

    /// Stop every track and forget the stream.
    ///
    /// Returns `false` when nothing was held, which makes repeated calls on
    /// overlapping exit paths harmless.
    pub fn release(&mut self) -> bool {
        let Some(stream) = self.stream.take() else {
            return false;
        };

        for track in stream.tracks() {
            track.stop();
        }

        info!(
            target: "ls.media",
            stream_id = %stream.id(),
            tracks = stream.tracks().len(),
            "Local stream released"
        );
        metrics::record_media_released();
        true
    }
}

impl Drop for MediaCapture {
    fn drop(&mut self) {
        if self.release() {
            debug!(target: "ls.media", "Local stream released on drop");
        }
    }
}
