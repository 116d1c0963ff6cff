//! Task lifecycle: state machine, record store, scheduling and execution.

pub mod clock;
pub mod continuation;
mod executor;
mod gate;
pub mod retry;
mod scheduler;
mod state;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use executor::{RunReport, TaskExecutor};
pub use gate::UsageLimitGate;
pub use retry::{RetryContext, synthesize};
pub use scheduler::Scheduler;
pub use state::{StatusChange, TaskStateMachine};
pub use store::{JsonTaskStore, MemoryTaskStore, TaskStore};
