//! lockstep-session — drives a debugger session against one shared engine.
//!
//! A [`RequestDriver`] keeps calling the program's handler function while
//! [`ControlClient`] operations issue debugger commands against the same
//! engine. Responses come back through the [`Dispatcher`], which
//! correlates them to the command that caused them. The [`Coordinator`]
//! owns the engine and sequences startup and shutdown.

pub mod control;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod lifecycle;
pub mod progress;
pub mod sequential;
pub mod shutdown;

// Re-export key types for convenience.
pub use control::{BreakpointSet, ControlClient};
pub use dispatcher::{DispatchResult, DispatchStats, Dispatcher};
pub use driver::{build_request, DriverReport, RequestDriver};
pub use error::SessionError;
pub use lifecycle::{
    BreakpointPlan, Coordinator, LifecycleState, OperationOutcome, SessionOptions,
    SimulationReport,
};
pub use progress::DriverProgress;
pub use sequential::{SequentialReport, SEQUENTIAL_ITERATIONS};
pub use shutdown::ShutdownSignal;
