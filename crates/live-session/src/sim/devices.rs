//! Simulated capture devices.

use crate::media::{DeviceError, MediaConstraints, MediaDevices, MediaTrack, TrackKind};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct DeviceCounters {
    acquisitions: AtomicUsize,
    tracks_opened: AtomicUsize,
    tracks_stopped: AtomicUsize,
    enabled_writes: AtomicUsize,
}

/// In-memory camera and microphone.
///
/// Clones share counters, so a test can keep one clone for assertions and
/// hand another to a [`crate::media::MediaCapture`].
#[derive(Debug, Clone, Default)]
pub struct SimulatedDevices {
    counters: Arc<DeviceCounters>,
    deny: Option<DeviceError>,
}

impl SimulatedDevices {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices that refuse every acquisition with `error`.
    #[must_use]
    pub fn denying(error: DeviceError) -> Self {
        Self {
            counters: Arc::default(),
            deny: Some(error),
        }
    }

    /// Successful `open` calls.
    #[must_use]
    pub fn acquisitions(&self) -> usize {
        self.counters.acquisitions.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn tracks_opened(&self) -> usize {
        self.counters.tracks_opened.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn tracks_stopped(&self) -> usize {
        self.counters.tracks_stopped.load(Ordering::SeqCst)
    }

    /// Tracks opened and not yet stopped.
    #[must_use]
    pub fn live_tracks(&self) -> usize {
        self.tracks_opened().saturating_sub(self.tracks_stopped())
    }

    /// Number of times a track's enabled flag was written.
    #[must_use]
    pub fn enabled_flag_writes(&self) -> usize {
        self.counters.enabled_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDevices for SimulatedDevices {
    async fn open(
        &self,
        constraints: MediaConstraints,
    ) -> Result<Vec<Arc<dyn MediaTrack>>, DeviceError> {
        if let Some(error) = &self.deny {
            return Err(error.clone());
        }

        let mut tracks: Vec<Arc<dyn MediaTrack>> = Vec::new();
        if constraints.audio {
            tracks.push(Arc::new(SimulatedTrack::new(
                TrackKind::Audio,
                Arc::clone(&self.counters),
            )));
        }
        if constraints.video {
            tracks.push(Arc::new(SimulatedTrack::new(
                TrackKind::Video,
                Arc::clone(&self.counters),
            )));
        }

        self.counters.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.counters
            .tracks_opened
            .fetch_add(tracks.len(), Ordering::SeqCst);
        Ok(tracks)
    }
}

#[derive(Debug)]
struct SimulatedTrack {
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
    counters: Arc<DeviceCounters>,
}

impl SimulatedTrack {
    fn new(kind: TrackKind, counters: Arc<DeviceCounters>) -> Self {
        Self {
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            counters,
        }
    }
}

impl MediaTrack for SimulatedTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        self.counters.enabled_writes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        // Count each track once even if stopped repeatedly
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.counters.tracks_stopped.fetch_add(1, Ordering::SeqCst);
        }
    }
}
