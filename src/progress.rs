use std::sync::{Arc, Mutex};

/// Events emitted by the engine for progress reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A podcast folder was scanned
    ScanCompleted {
        podcast_id: String,
        discovered: usize,
    },

    /// An upload batch was selected
    UploadPlanned {
        podcast_id: String,
        session: String,
        episodes: usize,
        total_bytes: u64,
        chunks: usize,
    },

    /// An upload task started
    UploadStarting {
        podcast_id: String,
        /// Position of the task within its chunk (0 to chunk_size-1)
        slot: usize,
        filename: String,
        size: u64,
    },

    /// An episode is now available remotely
    UploadCompleted {
        podcast_id: String,
        slot: usize,
        filename: String,
        location: String,
        /// The remote object already existed with the same size
        reused: bool,
    },

    /// An upload task failed; the episode stays New
    UploadFailed {
        podcast_id: String,
        slot: usize,
        filename: String,
        error: String,
    },

    /// Every task of a chunk finished and its results were stored
    ChunkCompleted {
        podcast_id: String,
        chunk_index: usize,
        total_chunks: usize,
        uploaded: usize,
        failed: usize,
    },

    /// An episode was removed remotely
    EpisodeDeleted { podcast_id: String, filename: String },

    /// A remote removal failed; the episode stays Uploaded
    DeleteFailed {
        podcast_id: String,
        filename: String,
        error: String,
    },

    /// Episodes were put back into the upload queue
    RollbackCompleted {
        podcast_id: String,
        session: Option<String>,
        restored: usize,
    },

    /// The podcast cover image was uploaded
    ImagePublished { podcast_id: String, location: String },

    /// The feed document was regenerated and uploaded
    FeedPublished { podcast_id: String, location: String },
}

/// Trait for reporting progress events during synchronization.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

/// Reporter that keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of the events reported so far
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
