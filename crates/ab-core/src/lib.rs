/// Configuration, types, and shared structures for audiobrain.
///
/// This crate contains the snapshot types, the pipeline configuration,
/// the stream clock, and the producer/consumer seams used across the workspace.

pub mod clock;
pub mod config;
pub mod error;
pub mod snapshot;
pub mod traits;

pub use clock::StreamClock;
pub use config::{BeatTuning, PipelineConfig};
pub use error::CoreError;
pub use snapshot::{BandMagnitudes, FeatureSnapshot};
pub use traits::{FrameSink, SnapshotSource};
