pub mod app;
pub mod config;
pub mod episode;
pub mod error;
pub mod feed;
pub mod object_store;
pub mod progress;
pub mod session;
pub mod store;
pub mod sync;

// Re-export main types for convenience
pub use app::{App, Failure, RunPlan, RunReport, select_podcasts};
pub use config::{Config, Podcast, PodcastInfo};
pub use episode::{Episode, Status, list_audio_files};
pub use error::{ConfigError, DiscoveryError, FeedError, ObjectStoreError, StoreError, SyncError};
pub use feed::{feed_filename, render_feed};
pub use object_store::{
    HttpObjectStore, LocalObjectStore, MemoryObjectStore, ObjectInfo, ObjectStore,
    SharedObjectStore,
};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use session::Session;
pub use store::RecordStore;
pub use sync::{DeleteResult, Engine, RollbackResult, UploadResult};
