//! Wire events, normalized operations and the client-facing output items.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireKind {
    /// Carries a payload for the event parser.
    Event,
    /// Framing noise such as heartbeats; observed, never parsed.
    Other,
}

/// One discrete protocol event produced by a demultiplexer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireEvent {
    pub kind: WireKind,
    pub name: Option<String>,
    pub data: String,
}

impl WireEvent {
    pub fn event<S: Into<String>>(name: Option<String>, data: S) -> Self {
        Self { kind: WireKind::Event, name, data: data.into() }
    }

    pub fn other<S: Into<String>>(name: Option<String>, data: S) -> Self {
        Self { kind: WireKind::Other, name, data: data.into() }
    }

    pub fn is_event(&self) -> bool {
        self.kind == WireKind::Event
    }
}

/// The vendor-independent vocabulary every event parser compresses into.
#[derive(Clone, Debug, PartialEq)]
pub enum NormalizedOp {
    TextDelta(String),
    SetField(Value),
    Issue { code: String, message: String },
    Close,
}

impl NormalizedOp {
    pub fn text<S: Into<String>>(s: S) -> Self {
        NormalizedOp::TextDelta(s.into())
    }

    /// `SetField` with a single-key object, the shape all parsers use.
    pub fn field<K: Into<String>>(key: K, value: Value) -> Self {
        let mut map = serde_json::Map::new();
        map.insert(key.into(), value);
        NormalizedOp::SetField(Value::Object(map))
    }

    pub fn issue<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        NormalizedOp::Issue { code: code.into(), message: message.into() }
    }
}

/// Operation shape forwarded to the client.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientOp {
    Text(String),
    Set(Value),
    Issue { code: String, message: String },
}

/// Machine-distinguishable reason carried by the terminal item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reason {
    DispatchPrepare,
    DispatchFetch,
    DispatchRead,
    DispatchParse,
    DispatchClose,
    EventDone,
    ParserDone,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::DispatchPrepare => "dispatch-prepare",
            Reason::DispatchFetch => "dispatch-fetch",
            Reason::DispatchRead => "dispatch-read",
            Reason::DispatchParse => "dispatch-parse",
            Reason::DispatchClose => "dispatch-close",
            Reason::EventDone => "event-done",
            Reason::ParserDone => "parser-done",
        }
    }

    /// True when the call ended because a stage failed.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Reason::DispatchPrepare
                | Reason::DispatchFetch
                | Reason::DispatchRead
                | Reason::DispatchParse
        )
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item of the ordered output sequence a call produces.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientItem {
    Start,
    Op {
        #[serde(flatten)]
        op: ClientOp,
    },
    End { reason: Reason, message: String },
}

impl ClientItem {
    pub fn op(op: ClientOp) -> Self {
        ClientItem::Op { op }
    }

    pub fn end<M: Into<String>>(reason: Reason, message: M) -> Self {
        ClientItem::End { reason, message: message.into() }
    }

    pub fn reason(&self) -> Option<Reason> {
        match self {
            ClientItem::End { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_items_serialize_to_tagged_json() {
        let start = serde_json::to_value(ClientItem::Start).unwrap();
        assert_eq!(start, json!({"type": "start"}));

        let text = serde_json::to_value(ClientItem::op(ClientOp::Text("hi".into()))).unwrap();
        assert_eq!(text, json!({"type": "op", "text": "hi"}));

        let set = serde_json::to_value(ClientItem::op(ClientOp::Set(
            json!({"finish_reason": "stop"}),
        )))
        .unwrap();
        assert_eq!(set, json!({"type": "op", "set": {"finish_reason": "stop"}}));

        let end = serde_json::to_value(ClientItem::end(Reason::EventDone, "stream complete"))
            .unwrap();
        assert_eq!(
            end,
            json!({"type": "end", "reason": "event-done", "message": "stream complete"})
        );
    }

    #[test]
    fn reason_codes_match_wire_strings() {
        let all = [
            Reason::DispatchPrepare,
            Reason::DispatchFetch,
            Reason::DispatchRead,
            Reason::DispatchParse,
            Reason::DispatchClose,
            Reason::EventDone,
            Reason::ParserDone,
        ];
        for r in all {
            assert_eq!(serde_json::to_value(r).unwrap(), json!(r.as_str()));
        }
        assert!(Reason::DispatchRead.is_error());
        assert!(!Reason::DispatchClose.is_error());
        assert!(!Reason::ParserDone.is_error());
    }

    #[test]
    fn field_builds_single_key_object() {
        assert_eq!(
            NormalizedOp::field("role", json!("assistant")),
            NormalizedOp::SetField(json!({"role": "assistant"}))
        );
    }
}
