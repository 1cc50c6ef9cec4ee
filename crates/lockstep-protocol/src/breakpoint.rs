//! Breakpoint locations and bookkeeping.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::protocol::{CommandKind, ProtocolMessage};

/// Source position a breakpoint resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BreakpointLocation {
    /// Line, as reported by the engine.
    pub line: i64,
    /// Column, as reported by the engine.
    pub column: i64,
}

impl BreakpointLocation {
    /// Create a location.
    pub fn new(line: i64, column: i64) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for BreakpointLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Recover the resolved location from a `setbreakpoint` response.
///
/// Returns `Ok(None)` for every message that is not a `setbreakpoint`
/// message whose body carries a `type` field, so it is safe to run on all
/// inbound traffic. A matching message without integer `line`/`column`
/// yields [`ProtocolError::MissingField`].
pub fn extract(message: &ProtocolMessage) -> Result<Option<BreakpointLocation>, ProtocolError> {
    if message.command_kind() != Some(CommandKind::SetBreakpoint) {
        return Ok(None);
    }
    let Some(body) = message.body.as_ref() else {
        return Ok(None);
    };
    if body.get("type").is_none() {
        return Ok(None);
    }

    let line = integer_field(body, "line").ok_or(ProtocolError::MissingField { field: "body.line" })?;
    let column = integer_field(body, "column").ok_or(ProtocolError::MissingField {
        field: "body.column",
    })?;
    Ok(Some(BreakpointLocation { line, column }))
}

fn integer_field(body: &Value, key: &str) -> Option<i64> {
    body.get(key).and_then(Value::as_i64)
}

/// A breakpoint the engine acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedBreakpoint {
    /// Engine-assigned id.
    pub id: i64,
    /// Function the breakpoint targets.
    pub target: String,
    /// Resolved location.
    pub location: BreakpointLocation,
}

/// Session-side record of acknowledged breakpoints, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct BreakpointBook {
    breakpoints: BTreeMap<i64, TrackedBreakpoint>,
}

impl BreakpointBook {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a breakpoint, replacing any entry with the same id.
    pub fn add(&mut self, bp: TrackedBreakpoint) {
        self.breakpoints.insert(bp.id, bp);
    }

    /// Remove a breakpoint. Returns `true` if it was known.
    pub fn remove(&mut self, id: i64) -> bool {
        self.breakpoints.remove(&id).is_some()
    }

    /// Look up a breakpoint by id.
    pub fn get(&self, id: i64) -> Option<&TrackedBreakpoint> {
        self.breakpoints.get(&id)
    }

    /// All breakpoints in id order.
    pub fn all(&self) -> impl Iterator<Item = &TrackedBreakpoint> {
        self.breakpoints.values()
    }

    /// Number of tracked breakpoints.
    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    /// Whether no breakpoints are tracked.
    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// Forget every breakpoint.
    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_message;

    fn message(raw: &str) -> ProtocolMessage {
        decode_message(raw).unwrap()
    }

    #[test]
    fn extract_reads_line_and_column() {
        let msg = message(
            r#"{"seq":1,"type":"response","command":"setbreakpoint","body":{"type":"break","line":4,"column":2}}"#,
        );
        assert_eq!(extract(&msg).unwrap(), Some(BreakpointLocation::new(4, 2)));
    }

    #[test]
    fn extract_reads_engine_response() {
        let msg = message(
            r#"{"seq":3,"request_seq":1,"type":"response","command":"setbreakpoint","success":true,"running":true,"body":{"type":"function","breakpoint":1,"line":1,"column":0,"actual_locations":[]}}"#,
        );
        assert_eq!(extract(&msg).unwrap(), Some(BreakpointLocation::new(1, 0)));
    }

    #[test]
    fn extract_ignores_other_commands() {
        let raws = [
            r#"{"type":"response","command":"listbreakpoints","body":{"type":"x","line":1,"column":1}}"#,
            r#"{"type":"response","command":"continue","running":true}"#,
            r#"{"type":"event","event":"break","body":{"sourceLine":1}}"#,
            r#"{"type":"response","command":"clearbreakpoint","body":{"type":"function","breakpoint":1}}"#,
        ];
        for raw in raws {
            assert_eq!(extract(&message(raw)).unwrap(), None, "{raw}");
        }
    }

    #[test]
    fn extract_ignores_setbreakpoint_without_body_type() {
        let no_body = message(r#"{"type":"response","command":"setbreakpoint","success":false}"#);
        assert_eq!(extract(&no_body).unwrap(), None);

        let untyped = message(r#"{"type":"response","command":"setbreakpoint","body":{"line":1}}"#);
        assert_eq!(extract(&untyped).unwrap(), None);
    }

    #[test]
    fn extract_requires_integer_fields() {
        let missing_line = message(
            r#"{"type":"response","command":"setbreakpoint","body":{"type":"function","column":0}}"#,
        );
        assert!(matches!(
            extract(&missing_line),
            Err(ProtocolError::MissingField { field: "body.line" })
        ));

        let string_column = message(
            r#"{"type":"response","command":"setbreakpoint","body":{"type":"function","line":1,"column":"0"}}"#,
        );
        assert!(matches!(
            extract(&string_column),
            Err(ProtocolError::MissingField {
                field: "body.column"
            })
        ));

        let float_line = message(
            r#"{"type":"response","command":"setbreakpoint","body":{"type":"function","line":1.5,"column":0}}"#,
        );
        assert!(extract(&float_line).is_err());
    }

    #[test]
    fn location_display_matches_line_colon_column() {
        assert_eq!(BreakpointLocation::new(12, 3).to_string(), "12:3");
    }

    #[test]
    fn book_add_get_remove() {
        let mut book = BreakpointBook::new();
        assert!(book.is_empty());
        book.add(TrackedBreakpoint {
            id: 2,
            target: "f".into(),
            location: BreakpointLocation::new(1, 0),
        });
        book.add(TrackedBreakpoint {
            id: 1,
            target: "g".into(),
            location: BreakpointLocation::new(3, 0),
        });
        assert_eq!(book.len(), 2);
        assert_eq!(book.get(2).unwrap().target, "f");

        let ids: Vec<i64> = book.all().map(|bp| bp.id).collect();
        assert_eq!(ids, vec![1, 2]);

        assert!(book.remove(1));
        assert!(!book.remove(1));
        assert_eq!(book.len(), 1);

        book.clear();
        assert!(book.is_empty());
    }

    #[test]
    fn book_add_replaces_same_id() {
        let mut book = BreakpointBook::new();
        for line in [1, 5] {
            book.add(TrackedBreakpoint {
                id: 1,
                target: "f".into(),
                location: BreakpointLocation::new(line, 0),
            });
        }
        assert_eq!(book.len(), 1);
        assert_eq!(book.get(1).unwrap().location.line, 5);
    }
}
