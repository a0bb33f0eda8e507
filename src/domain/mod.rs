//! Domain data structures for pipeline runs.

pub mod artifact;
pub mod error;
pub mod events;
pub mod run;

pub use artifact::{image_reference, Artifact};
pub use error::{BuildError, StageError};
pub use events::{EventKind, RunEvent, StageStatus};
pub use run::{
    OverallStatus, PipelineRun, RunHeader, StageRecord, TriggerContext, TriggerEvent,
};
