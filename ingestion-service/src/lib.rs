pub mod clock;
pub mod config;
pub mod directory;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use pipeline::{BatchCommitter, CommitterSettings, IngestError, IngestStatus, IngestionResult};
