//! Lifecycle coordinator.
//!
//! Owns the engine from bootstrap to disposal and sequences the request
//! driver and the control activities:
//!
//! `Uninitialized → EngineReady → Running → Draining → Stopped`
//!
//! Activities are joined before the engine is disposed, so none of them
//! can outlive it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::timeout;

use lockstep_engine::{EngineHandle, HandlerFunction, ScriptEngine};
use lockstep_protocol::{BreakpointBook, BreakpointLocation, CommandKind, SeqAllocator};

use crate::control::ControlClient;
use crate::dispatcher::{DispatchStats, Dispatcher};
use crate::driver::{DriverReport, RequestDriver};
use crate::error::SessionError;
use crate::progress::DriverProgress;
use crate::sequential::{self, SequentialReport};
use crate::shutdown::ShutdownSignal;

/// Coordinator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing created yet.
    Uninitialized,
    /// Program loaded and handler resolved.
    EngineReady,
    /// Activities running.
    Running,
    /// Shutdown requested; joining activities.
    Draining,
    /// Engine disposed. Terminal.
    Stopped,
}

impl LifecycleState {
    fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::EngineReady => "engine-ready",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }

    /// The only state each state may move to.
    fn successor(&self) -> Option<LifecycleState> {
        match self {
            LifecycleState::Uninitialized => Some(LifecycleState::EngineReady),
            LifecycleState::EngineReady => Some(LifecycleState::Running),
            LifecycleState::Running => Some(LifecycleState::Draining),
            LifecycleState::Draining => Some(LifecycleState::Stopped),
            LifecycleState::Stopped => None,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breakpoint placed by the scripted control sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointPlan {
    /// Function to break in.
    pub target: String,
    /// Line offset within the function.
    pub line: i64,
    /// Column offset.
    pub column: i64,
}

/// Knobs for one session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Client name placed in every request.
    pub client: String,
    /// Global function the driver calls.
    pub handler_function: String,
    /// Bound on each control command.
    pub command_timeout: Duration,
    /// Bound on waiting for the driver's first iteration.
    pub readiness_timeout: Duration,
    /// Pause between driver iterations.
    pub request_interval: Duration,
    /// Stop the driver after this many requests.
    pub max_requests: Option<u64>,
    /// Command transport buffer capacity, in UTF-16 units.
    pub command_buffer_units: usize,
    /// Breakpoint for the control sequence.
    pub breakpoint: BreakpointPlan,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            client: "Chrome Canary".into(),
            handler_function: "DebugUserRequest".into(),
            command_timeout: Duration::from_millis(2000),
            readiness_timeout: Duration::from_millis(5000),
            request_interval: Duration::from_millis(1),
            max_requests: None,
            command_buffer_units: lockstep_protocol::DEFAULT_BUFFER_UNITS,
            breakpoint: BreakpointPlan {
                target: "DebugUserRequest".into(),
                line: 1,
                column: 0,
            },
        }
    }
}

/// Result of one control operation in the scripted sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    /// The command issued.
    pub command: CommandKind,
    /// Whether it completed successfully.
    pub succeeded: bool,
    /// Summary of the result or the error.
    pub detail: String,
}

/// Everything a concurrent run produced.
#[derive(Debug, Clone, Default)]
pub struct SimulationReport {
    /// What the request driver did.
    pub driver: DriverReport,
    /// Control operations, in the order they ran.
    pub operations: Vec<OperationOutcome>,
    /// Latest location from a `setbreakpoint` response.
    pub latest_location: Option<BreakpointLocation>,
    /// Dispatcher counters at shutdown.
    pub dispatch: DispatchStats,
}

/// Owns the engine and runs a session against it.
pub struct Coordinator<E> {
    options: SessionOptions,
    state: LifecycleState,
    engine: Option<EngineHandle<E>>,
    handler: Option<HandlerFunction>,
    dispatcher: Arc<Dispatcher>,
    seqs: Arc<SeqAllocator>,
    book: Arc<Mutex<BreakpointBook>>,
    shutdown: ShutdownSignal,
}

impl<E: ScriptEngine + 'static> Coordinator<E> {
    /// A coordinator with no engine yet.
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            state: LifecycleState::Uninitialized,
            engine: None,
            handler: None,
            dispatcher: Arc::new(Dispatcher::new()),
            seqs: Arc::new(SeqAllocator::new()),
            book: Arc::new(Mutex::new(BreakpointBook::new())),
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The shutdown signal shared with the activities.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// The dispatcher installed on the engine.
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    fn advance(&mut self, to: LifecycleState) -> Result<(), SessionError> {
        if self.state.successor() != Some(to) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(from = %self.state, %to, "lifecycle transition");
        self.state = to;
        Ok(())
    }

    /// Install the dispatcher, load the program and resolve the handler.
    pub fn bootstrap(
        &mut self,
        engine: E,
        program_name: &str,
        source: &str,
    ) -> Result<(), SessionError> {
        if self.state != LifecycleState::Uninitialized {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: LifecycleState::EngineReady,
            });
        }

        engine.set_debug_message_handler(Some(self.dispatcher.handler()));
        engine
            .compile_and_run(program_name, source)
            .map_err(|e| SessionError::BootstrapFailure(format!("{program_name}: {e}")))?;
        let handler = engine
            .resolve_global_function(&self.options.handler_function)
            .map_err(|e| SessionError::BootstrapFailure(e.to_string()))?;

        tracing::info!(program = program_name, handler = handler.name(), "engine ready");
        self.engine = Some(EngineHandle::new(engine));
        self.handler = Some(handler);
        self.advance(LifecycleState::EngineReady)
    }

    /// A client for issuing debugger commands against the engine.
    pub fn control(&self) -> Result<ControlClient<E>, SessionError> {
        let engine = self.engine.as_ref().ok_or(SessionError::InvalidTransition {
            from: self.state,
            to: LifecycleState::Running,
        })?;
        Ok(ControlClient::new(
            engine.share(),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.seqs),
            Arc::clone(&self.book),
        )
        .with_timeout(self.options.command_timeout)
        .with_buffer_units(self.options.command_buffer_units))
    }

    fn ready_parts(&self) -> Result<(&EngineHandle<E>, HandlerFunction), SessionError> {
        match (self.engine.as_ref(), self.handler.as_ref()) {
            (Some(engine), Some(handler)) => Ok((engine, handler.clone())),
            _ => Err(SessionError::InvalidTransition {
                from: self.state,
                to: LifecycleState::Running,
            }),
        }
    }

    /// Run the driver alongside the scripted control sequence, then shut
    /// down and dispose the engine.
    pub async fn run(&mut self) -> Result<SimulationReport, SessionError> {
        let (engine, handler) = self.ready_parts()?;
        let progress = DriverProgress::new();
        let mut driver = RequestDriver::new(
            engine.share(),
            handler,
            self.options.client.clone(),
            self.shutdown.clone(),
        )
        .with_interval(self.options.request_interval)
        .with_progress(progress.clone());
        if let Some(limit) = self.options.max_requests {
            driver = driver.with_limit(limit);
        }
        let control = self.control()?;
        self.advance(LifecycleState::Running)?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let driver_task = tokio::task::spawn_blocking(move || driver.run(Some(ready_tx)));
        match timeout(self.options.readiness_timeout, ready_rx).await {
            Ok(Ok(())) => tracing::info!("request driver ready"),
            Ok(Err(_)) => tracing::warn!("request driver stopped before its first request"),
            Err(_) => tracing::warn!(
                timeout_ms = self.options.readiness_timeout.as_millis() as u64,
                "request driver not ready in time; continuing"
            ),
        }

        let operations = self.run_control_sequence(control, &progress).await;

        self.advance(LifecycleState::Draining)?;
        self.shutdown.set();
        let joined = driver_task.await;
        self.dispatcher.cancel_all();
        let driver_report = match joined {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(%err, "request driver failed");
                self.stop()?;
                return Err(SessionError::Join(err.to_string()));
            }
        };

        let report = SimulationReport {
            driver: driver_report,
            operations,
            latest_location: self.dispatcher.latest_location(),
            dispatch: self.dispatcher.stats(),
        };
        self.stop()?;
        Ok(report)
    }

    async fn run_control_sequence(
        &self,
        control: ControlClient<E>,
        progress: &DriverProgress,
    ) -> Vec<OperationOutcome> {
        let plan = self.options.breakpoint.clone();
        let mut outcomes = Vec::new();

        let client = control.clone();
        let set = join_activity(CommandKind::SetBreakpoint, async move {
            client
                .set_breakpoint(&plan.target, plan.line, plan.column)
                .await
        })
        .await;
        if set.is_ok() {
            // An iteration finishing right after the snapshot may have
            // started before the breakpoint existed.
            let target = progress.completed() + 2;
            if !progress.wait_for(target, self.options.readiness_timeout).await {
                tracing::warn!(
                    completed = progress.completed(),
                    "request driver did not run while the breakpoint was set"
                );
            }
        }
        let breakpoint_id = set.as_ref().map(|set| set.id).unwrap_or(1);
        let set = set.map(|set| format!("breakpoint {} at {}", set.id, set.location));
        outcomes.push(outcome(CommandKind::SetBreakpoint, set));

        outcomes.push(list_step(&control).await);

        let client = control.clone();
        let cleared = join_activity(CommandKind::ClearBreakpoint, async move {
            client.clear_breakpoint(breakpoint_id).await
        })
        .await
        .map(|()| format!("breakpoint {breakpoint_id} cleared"));
        outcomes.push(outcome(CommandKind::ClearBreakpoint, cleared));

        outcomes.push(list_step(&control).await);

        let client = control;
        let resumed = join_activity(CommandKind::Continue, async move {
            client.continue_execution().await
        })
        .await
        .map(|running| format!("running: {running}"));
        outcomes.push(outcome(CommandKind::Continue, resumed));

        outcomes
    }

    /// Run the single-threaded simulation: every fifth iteration (after
    /// the first) sends `setbreakpoint`, every other iteration calls the
    /// handler. Disposes the engine afterwards.
    pub fn run_sequential(&mut self, iterations: u64) -> Result<SequentialReport, SessionError> {
        if self.state != LifecycleState::EngineReady {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: LifecycleState::Running,
            });
        }
        self.advance(LifecycleState::Running)?;
        let (engine, handler) = self.ready_parts()?;
        let report = sequential::run(
            engine,
            &handler,
            &self.dispatcher,
            &self.seqs,
            &self.options,
            iterations,
        );
        self.advance(LifecycleState::Draining)?;
        self.shutdown.set();
        self.dispatcher.cancel_all();
        self.stop()?;
        Ok(report)
    }

    fn stop(&mut self) -> Result<(), SessionError> {
        if let Some(handle) = self.engine.take() {
            let engine = handle.dispose()?;
            engine.set_debug_message_handler(None);
            drop(engine);
        }
        self.handler = None;
        self.advance(LifecycleState::Stopped)?;
        tracing::info!("session stopped");
        Ok(())
    }
}

async fn list_step<E: ScriptEngine + 'static>(control: &ControlClient<E>) -> OperationOutcome {
    let client = control.clone();
    let listed = join_activity(CommandKind::ListBreakpoints, async move {
        client.list_breakpoints().await
    })
    .await
    .map(|listed| format!("{} breakpoint(s)", listed.len()));
    outcome(CommandKind::ListBreakpoints, listed)
}

/// Spawn one control activity and join it.
async fn join_activity<T, F>(command: CommandKind, activity: F) -> Result<T, SessionError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, SessionError>> + Send + 'static,
{
    tracing::debug!(%command, "control activity starting");
    tokio::spawn(activity)
        .await
        .map_err(|e| SessionError::Join(e.to_string()))?
}

fn outcome(command: CommandKind, result: Result<String, SessionError>) -> OperationOutcome {
    match result {
        Ok(detail) => OperationOutcome {
            command,
            succeeded: true,
            detail,
        },
        Err(err) => {
            tracing::warn!(%command, %err, "control activity failed");
            OperationOutcome {
                command,
                succeeded: false,
                detail: err.to_string(),
            }
        }
    }
}
