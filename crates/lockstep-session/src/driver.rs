//! Request driver.
//!
//! Repeatedly calls the program's handler function with a synthetic
//! request and pumps debug messages, until shutdown is requested.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::oneshot;

use lockstep_engine::{EngineError, EngineRef, HandlerFunction, ScriptEngine};

use crate::progress::DriverProgress;
use crate::shutdown::ShutdownSignal;

/// Build the request document for iteration `counter`.
pub fn build_request(client: &str, counter: u64) -> Value {
    json!({
        "type": "json",
        "client": client,
        "counter": counter,
    })
}

/// What the driver did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverReport {
    /// Handler calls attempted.
    pub requests: u64,
    /// Handler calls that raised an error.
    pub failures: u64,
    /// Pumps that failed.
    pub pump_failures: u64,
    /// Debug messages delivered by the driver's pumps.
    pub messages: usize,
}

/// Background activity feeding requests into the engine.
pub struct RequestDriver<E> {
    engine: EngineRef<E>,
    handler: HandlerFunction,
    client: String,
    shutdown: ShutdownSignal,
    interval: Option<Duration>,
    limit: Option<u64>,
    progress: DriverProgress,
}

impl<E: ScriptEngine> RequestDriver<E> {
    /// A driver that runs until `shutdown` is set.
    pub fn new(
        engine: EngineRef<E>,
        handler: HandlerFunction,
        client: impl Into<String>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            engine,
            handler,
            client: client.into(),
            shutdown,
            interval: None,
            limit: None,
            progress: DriverProgress::new(),
        }
    }

    /// Pause between iterations.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = (!interval.is_zero()).then_some(interval);
        self
    }

    /// Report completed iterations to `progress`.
    pub fn with_progress(mut self, progress: DriverProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Stop after `limit` requests even without a shutdown.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Run the loop on the current thread. `ready` fires after the first
    /// iteration completes.
    pub fn run(self, ready: Option<oneshot::Sender<()>>) -> DriverReport {
        let mut ready = ready;
        let mut report = DriverReport::default();
        let mut counter: u64 = 0;
        let _finished = self.progress.finish_on_drop();

        loop {
            if self.shutdown.is_set() {
                tracing::debug!(counter, "shutdown observed; driver stopping");
                break;
            }
            if self.limit.is_some_and(|limit| counter >= limit) {
                tracing::debug!(counter, "request limit reached");
                break;
            }

            let request = build_request(&self.client, counter);
            tracing::trace!(%request, "calling {}", self.handler.name());
            let outcome = self.engine.with_engine(|engine| {
                let call = engine.call_function(&self.handler, &request);
                let pump = engine.pump_debug_messages();
                (call, pump)
            });

            let (call, pump) = match outcome {
                Ok(results) => results,
                Err(EngineError::Disposed) => {
                    tracing::warn!(counter, "engine disposed under the driver");
                    break;
                }
                Err(err) => {
                    tracing::warn!(counter, %err, "engine unavailable; driver stopping");
                    break;
                }
            };

            report.requests += 1;
            if let Err(err) = call {
                report.failures += 1;
                tracing::warn!(counter, %err, handler = self.handler.name(), "handler call failed");
            }
            match pump {
                Ok(delivered) => report.messages += delivered,
                Err(err) => {
                    report.pump_failures += 1;
                    tracing::warn!(counter, %err, "debug message pump failed");
                }
            }

            counter += 1;
            self.progress.record();
            if let Some(tx) = ready.take() {
                // The coordinator may have stopped waiting.
                let _ = tx.send(());
            }
            if let Some(interval) = self.interval {
                std::thread::sleep(interval);
            }
        }

        tracing::info!(
            requests = report.requests,
            failures = report.failures,
            "request driver finished"
        );
        report
    }
}
