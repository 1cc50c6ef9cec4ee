//! Debug message dispatcher.
//!
//! Installed once as the engine's message handler and never replaced.
//! Commands register their sequence number before they are sent; each
//! response is routed to the pending entry it answers through a oneshot
//! channel. Events and unmatched responses are logged and counted.
//!
//! The handler runs on whichever thread is pumping the engine, while that
//! thread holds the engine lock, so it only decodes and stores.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use lockstep_engine::MessageHandler;
use lockstep_protocol::{
    decode_message, extract, BreakpointLocation, CommandKind, MessageType, ProtocolMessage,
};

/// The result dispatched to a waiting command.
#[derive(Debug)]
pub enum DispatchResult {
    /// The engine accepted the command.
    Success(ProtocolMessage),
    /// The engine answered with `success: false`.
    Failure(ProtocolMessage),
}

/// Counters describing everything the dispatcher has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Responses routed to a pending command.
    pub delivered: usize,
    /// Events received.
    pub events: usize,
    /// Responses with no matching pending command.
    pub dropped: usize,
    /// Messages that failed to decode.
    pub malformed: usize,
}

struct PendingCommand {
    command: CommandKind,
    order: u64,
    sender: oneshot::Sender<DispatchResult>,
}

#[derive(Default)]
struct DispatcherState {
    pending: HashMap<i64, PendingCommand>,
    next_order: u64,
    latest_location: Option<BreakpointLocation>,
    stats: DispatchStats,
}

impl DispatcherState {
    /// Take the entry a response answers: by `request_seq`, else the
    /// oldest pending entry for the same command.
    fn take_for(&mut self, message: &ProtocolMessage) -> Option<(i64, PendingCommand)> {
        if let Some(seq) = message.request_seq {
            if let Some(entry) = self.pending.remove(&seq) {
                return Some((seq, entry));
            }
        }
        let kind = message.command_kind()?;
        let seq = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.command == kind)
            .min_by_key(|(_, entry)| entry.order)
            .map(|(seq, _)| *seq)?;
        self.pending.remove(&seq).map(|entry| (seq, entry))
    }
}

/// Routes engine messages to the commands waiting for them.
#[derive(Default)]
pub struct Dispatcher {
    state: Mutex<DispatcherState>,
}

impl Dispatcher {
    /// Create a dispatcher with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command about to be sent and return a receiver for its
    /// response.
    pub fn register(&self, seq: i64, command: CommandKind) -> oneshot::Receiver<DispatchResult> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        state.next_order += 1;
        let order = state.next_order;
        if state
            .pending
            .insert(
                seq,
                PendingCommand {
                    command,
                    order,
                    sender: tx,
                },
            )
            .is_some()
        {
            tracing::warn!(seq, %command, "replaced pending command with duplicate seq");
        }
        rx
    }

    /// How many commands are waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Cancel a pending command. Returns true if it was found.
    pub fn cancel(&self, seq: i64) -> bool {
        self.state.lock().pending.remove(&seq).is_some()
    }

    /// Cancel all pending commands. Their receivers observe a closed channel.
    pub fn cancel_all(&self) {
        self.state.lock().pending.clear();
    }

    /// The most recent location extracted from a `setbreakpoint` response.
    pub fn latest_location(&self) -> Option<BreakpointLocation> {
        self.state.lock().latest_location
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> DispatchStats {
        self.state.lock().stats
    }

    /// Decode and route one raw message. Never fails; bad input is logged
    /// and skipped.
    pub fn dispatch_raw(&self, raw: &str) {
        match decode_message(raw) {
            Ok(message) => self.dispatch(message),
            Err(err) => {
                self.state.lock().stats.malformed += 1;
                tracing::warn!(%err, raw, "dropping undecodable debug message");
            }
        }
    }

    /// Route a decoded message.
    pub fn dispatch(&self, message: ProtocolMessage) {
        match message.message_type {
            MessageType::Event => {
                self.state.lock().stats.events += 1;
                tracing::info!(event = %message.command, raw = %message.raw, "debug event");
            }
            MessageType::Request => {
                tracing::debug!(command = %message.command, "ignoring request echoed by engine");
            }
            MessageType::Response => self.route_response(message),
        }
    }

    fn route_response(&self, message: ProtocolMessage) {
        let mut state = self.state.lock();

        match extract(&message) {
            Ok(Some(location)) => {
                tracing::info!(%location, "breakpoint resolved");
                state.latest_location = Some(location);
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(%err, raw = %message.raw, "setbreakpoint response without location");
            }
        }

        let Some((seq, entry)) = state.take_for(&message) else {
            state.stats.dropped += 1;
            tracing::warn!(
                command = %message.command,
                request_seq = ?message.request_seq,
                "response for unknown command"
            );
            return;
        };
        state.stats.delivered += 1;
        drop(state);

        tracing::debug!(seq, command = %entry.command, success = message.succeeded(), "response routed");
        let result = if message.succeeded() {
            DispatchResult::Success(message)
        } else {
            DispatchResult::Failure(message)
        };
        // If the receiver was dropped, that's ok
        let _ = entry.sender.send(result);
    }

    /// A handler that feeds this dispatcher, for installation on the engine.
    pub fn handler(self: &Arc<Self>) -> MessageHandler {
        let dispatcher = Arc::clone(self);
        Arc::new(move |raw: &str| dispatcher.dispatch_raw(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(seq: i64, request_seq: i64, command: &str, extra: &str) -> String {
        format!(
            r#"{{"seq":{seq},"request_seq":{request_seq},"type":"response","command":"{command}","success":true,"running":true{extra}}}"#
        )
    }

    #[test]
    fn dispatcher_new_empty() {
        let disp = Dispatcher::new();
        assert_eq!(disp.pending_count(), 0);
        assert_eq!(disp.stats(), DispatchStats::default());
        assert!(disp.latest_location().is_none());
    }

    #[tokio::test]
    async fn dispatcher_register_and_resolve() {
        let disp = Dispatcher::new();
        let rx = disp.register(1, CommandKind::ListBreakpoints);
        assert_eq!(disp.pending_count(), 1);

        disp.dispatch_raw(&response(2, 1, "listbreakpoints", r#","body":{"breakpoints":[]}"#));
        assert_eq!(disp.pending_count(), 0);

        match rx.await.unwrap() {
            DispatchResult::Success(msg) => assert_eq!(msg.request_seq, Some(1)),
            DispatchResult::Failure(_) => panic!("expected success"),
        }
        assert_eq!(disp.stats().delivered, 1);
    }

    #[tokio::test]
    async fn dispatcher_routes_out_of_order_responses_by_seq() {
        let disp = Dispatcher::new();
        let first = disp.register(5, CommandKind::ListBreakpoints);
        let second = disp.register(6, CommandKind::ListBreakpoints);

        disp.dispatch_raw(&response(20, 6, "listbreakpoints", ""));
        disp.dispatch_raw(&response(21, 5, "listbreakpoints", ""));

        let DispatchResult::Success(a) = first.await.unwrap() else {
            panic!("expected success");
        };
        let DispatchResult::Success(b) = second.await.unwrap() else {
            panic!("expected success");
        };
        assert_eq!(a.seq, 21);
        assert_eq!(b.seq, 20);
    }

    #[tokio::test]
    async fn dispatcher_falls_back_to_oldest_same_command() {
        let disp = Dispatcher::new();
        let older = disp.register(9, CommandKind::Continue);
        let _newer = disp.register(4, CommandKind::Continue);
        let _other = disp.register(1, CommandKind::ListBreakpoints);

        disp.dispatch_raw(r#"{"seq":30,"type":"response","command":"continue","running":true}"#);

        let DispatchResult::Success(msg) = older.await.unwrap() else {
            panic!("expected success");
        };
        assert_eq!(msg.seq, 30);
        assert_eq!(disp.pending_count(), 2);
    }

    #[tokio::test]
    async fn dispatcher_failure_response() {
        let disp = Dispatcher::new();
        let rx = disp.register(10, CommandKind::ClearBreakpoint);
        disp.dispatch_raw(
            r#"{"seq":11,"request_seq":10,"type":"response","command":"clearbreakpoint","success":false,"running":true,"message":"Unknown breakpoint 1"}"#,
        );
        match rx.await.unwrap() {
            DispatchResult::Failure(msg) => {
                assert_eq!(msg.message.as_deref(), Some("Unknown breakpoint 1"))
            }
            DispatchResult::Success(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn dispatcher_extracts_location_from_setbreakpoint() {
        let disp = Dispatcher::new();
        let _rx = disp.register(1, CommandKind::SetBreakpoint);
        disp.dispatch_raw(&response(
            2,
            1,
            "setbreakpoint",
            r#","body":{"type":"function","breakpoint":1,"line":1,"column":0,"actual_locations":[]}"#,
        ));
        assert_eq!(disp.latest_location(), Some(BreakpointLocation::new(1, 0)));
    }

    #[test]
    fn dispatcher_unknown_response_dropped() {
        let disp = Dispatcher::new();
        disp.dispatch_raw(&response(2, 999, "listbreakpoints", ""));
        disp.dispatch_raw(r#"{"seq":3,"type":"response","command":"stepin"}"#);
        assert_eq!(disp.stats().dropped, 2);
    }

    #[test]
    fn dispatcher_counts_events_and_malformed() {
        let disp = Dispatcher::new();
        let _rx = disp.register(1, CommandKind::Continue);
        disp.dispatch_raw(r#"{"seq":4,"type":"event","event":"break","body":{"sourceLine":1}}"#);
        disp.dispatch_raw("{not json");
        disp.dispatch_raw(r#"{"command":"continue"}"#);

        let stats = disp.stats();
        assert_eq!(stats.events, 1);
        assert_eq!(stats.malformed, 2);
        assert_eq!(disp.pending_count(), 1, "malformed input must not touch pending commands");
    }

    #[test]
    fn dispatcher_bad_setbreakpoint_body_keeps_previous_location() {
        let disp = Dispatcher::new();
        disp.dispatch_raw(&response(1, 1, "setbreakpoint", r#","body":{"type":"function","line":4,"column":2}"#));
        disp.dispatch_raw(&response(2, 2, "setbreakpoint", r#","body":{"type":"function","line":"x"}"#));
        assert_eq!(disp.latest_location(), Some(BreakpointLocation::new(4, 2)));
    }

    #[tokio::test]
    async fn dispatcher_cancel_closes_receiver() {
        let disp = Dispatcher::new();
        let rx = disp.register(1, CommandKind::Continue);
        assert!(disp.cancel(1));
        assert!(!disp.cancel(1));
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn dispatcher_cancel_all() {
        let disp = Dispatcher::new();
        let a = disp.register(1, CommandKind::Continue);
        let b = disp.register(2, CommandKind::ListBreakpoints);
        disp.cancel_all();
        assert_eq!(disp.pending_count(), 0);
        assert!(a.await.is_err());
        assert!(b.await.is_err());
    }

    #[tokio::test]
    async fn dispatcher_handler_feeds_dispatcher() {
        let disp = Arc::new(Dispatcher::new());
        let rx = disp.register(7, CommandKind::ListBreakpoints);
        let handler = disp.handler();
        handler(&response(8, 7, "listbreakpoints", ""));
        assert!(matches!(rx.await.unwrap(), DispatchResult::Success(_)));
    }
}
