//! Core domain types for taskrail

mod model;
mod output_event;
mod project;
mod task;

pub use model::ModelInfo;
pub use output_event::{Completion, OutputEvent, OutputEventKind, TokenUsage, UsageLimitResult};
pub use project::Project;
pub use task::{
    ContinuationHint, Iteration, IterationOutcome, IterationStatus, ProjectId, Task, TaskId,
    TaskPatch, TaskStatus, TransitionError,
};
