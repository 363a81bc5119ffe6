//! Typed streaming protocol between the orchestrator and transports.
//!
//! Events serialize with a `type` tag so any consumer (SSE, WebSocket,
//! CLI) can dispatch without knowing the Rust enum. Every event passes
//! through an [`EventGate`] before it reaches the wire: malformed
//! events become error events, and a run of consecutive malformed
//! events past the cap aborts the stream instead of drip-feeding junk.

use clarion_core::RetrievedSource;
use serde::{Deserialize, Serialize};

/// How many malformed events in a row a stream tolerates before the
/// gate declares it fatal.
pub const MAX_CONSECUTIVE_MALFORMED: usize = 3;

/// One event in a streamed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A reasoning thought, surfaced as it happens.
    Thinking { content: String },

    /// A tool call was dispatched.
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },

    /// A tool call returned.
    Observation {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// The sources the answer is grounded in.
    Sources { sources: Vec<RetrievedSource> },

    /// Answer text.
    Content { text: String },

    /// Request-level accounting, sent once before `Done`.
    Metadata {
        steps: usize,
        tool_calls: usize,
        evidence_score: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        used_tier: Option<String>,
    },

    /// Something went wrong. A stream may carry several of these and
    /// still finish; a fatal error is the last event of the stream.
    Error { message: String },

    /// End of stream.
    Done,
}

impl StreamEvent {
    /// The wire name of this event, matching the serialized `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::Thinking { .. } => "thinking",
            StreamEvent::ToolCall { .. } => "tool_call",
            StreamEvent::Observation { .. } => "observation",
            StreamEvent::Sources { .. } => "sources",
            StreamEvent::Content { .. } => "content",
            StreamEvent::Metadata { .. } => "metadata",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Done => "done",
        }
    }

    /// Minimal schema check applied before an event is forwarded.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StreamEvent::Thinking { content } if content.trim().is_empty() => {
                Err("thinking event with empty content".into())
            }
            StreamEvent::ToolCall { id, name, .. } if id.is_empty() || name.is_empty() => {
                Err("tool_call event missing id or name".into())
            }
            StreamEvent::Observation { name, .. } if name.is_empty() => {
                Err("observation event missing tool name".into())
            }
            StreamEvent::Sources { sources } if sources.iter().any(|s| s.id.is_empty()) => {
                Err("sources event with an unidentified source".into())
            }
            StreamEvent::Content { text } if text.trim().is_empty() => {
                Err("content event with empty text".into())
            }
            StreamEvent::Metadata { evidence_score, .. }
                if !evidence_score.is_finite() || !(0.0..=1.0).contains(evidence_score) =>
            {
                Err(format!("metadata event with evidence score {evidence_score}"))
            }
            StreamEvent::Error { message } if message.trim().is_empty() => {
                Err("error event with empty message".into())
            }
            _ => Ok(()),
        }
    }
}

/// The stream became unusable and must be closed.
#[derive(Debug, thiserror::Error)]
#[error("stream aborted after {0} consecutive malformed events")]
pub struct StreamFatal(pub usize);

/// Per-stream validation gate.
///
/// Valid events pass through and reset the malformed counter. An
/// invalid event is replaced with an error event carrying the schema
/// complaint; once `MAX_CONSECUTIVE_MALFORMED` invalid events arrive
/// back to back the gate turns the degraded stream into a fatal one.
pub struct EventGate {
    consecutive_malformed: usize,
    cap: usize,
}

impl EventGate {
    pub fn new() -> Self {
        Self {
            consecutive_malformed: 0,
            cap: MAX_CONSECUTIVE_MALFORMED,
        }
    }

    pub fn admit(&mut self, event: StreamEvent) -> Result<StreamEvent, StreamFatal> {
        match event.validate() {
            Ok(()) => {
                self.consecutive_malformed = 0;
                Ok(event)
            }
            Err(complaint) => {
                self.consecutive_malformed += 1;
                if self.consecutive_malformed >= self.cap {
                    return Err(StreamFatal(self.consecutive_malformed));
                }
                Ok(StreamEvent::Error {
                    message: format!("malformed event dropped: {complaint}"),
                })
            }
        }
    }
}

impl Default for EventGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_type_tags() {
        let event = StreamEvent::ToolCall {
            id: "c1".into(),
            name: "vector_search".into(),
            arguments: serde_json::json!({"query": "kitas"}),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool_call");
        assert_eq!(value["name"], "vector_search");

        let done = serde_json::to_value(StreamEvent::Done).unwrap();
        assert_eq!(done["type"], "done");
    }

    #[test]
    fn event_type_matches_the_serialized_tag() {
        let events = vec![
            StreamEvent::Thinking {
                content: "hm".into(),
            },
            StreamEvent::Content {
                text: "answer".into(),
            },
            StreamEvent::Metadata {
                steps: 1,
                tool_calls: 0,
                evidence_score: 0.5,
                used_tier: None,
            },
            StreamEvent::Done,
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.event_type());
        }
    }

    #[test]
    fn round_trips_through_json() {
        let event = StreamEvent::Observation {
            id: "c1".into(),
            name: "calculator".into(),
            output: "4".into(),
            success: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: StreamEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, StreamEvent::Observation { output, .. } if output == "4"));
    }

    #[test]
    fn validation_rejects_empty_required_fields() {
        assert!(
            StreamEvent::Thinking {
                content: "  ".into()
            }
            .validate()
            .is_err()
        );
        assert!(StreamEvent::Content { text: "".into() }.validate().is_err());
        assert!(
            StreamEvent::ToolCall {
                id: "".into(),
                name: "calculator".into(),
                arguments: serde_json::Value::Null,
            }
            .validate()
            .is_err()
        );
        assert!(
            StreamEvent::Metadata {
                steps: 1,
                tool_calls: 1,
                evidence_score: f32::NAN,
                used_tier: None,
            }
            .validate()
            .is_err()
        );
        assert!(StreamEvent::Done.validate().is_ok());
    }

    #[test]
    fn gate_converts_a_malformed_event_into_an_error_event() {
        let mut gate = EventGate::new();
        let admitted = gate
            .admit(StreamEvent::Content { text: "".into() })
            .unwrap();
        assert!(matches!(admitted, StreamEvent::Error { message } if message.contains("malformed")));
    }

    #[test]
    fn gate_resets_the_counter_on_a_valid_event() {
        let mut gate = EventGate::new();
        for _ in 0..MAX_CONSECUTIVE_MALFORMED - 1 {
            gate.admit(StreamEvent::Content { text: "".into() }).unwrap();
        }
        gate.admit(StreamEvent::Content { text: "ok".into() }).unwrap();
        // The run was broken; the next malformed event starts over.
        assert!(gate.admit(StreamEvent::Content { text: "".into() }).is_ok());
    }

    #[test]
    fn gate_turns_a_malformed_run_into_a_fatal_error() {
        let mut gate = EventGate::new();
        for _ in 0..MAX_CONSECUTIVE_MALFORMED - 1 {
            assert!(gate.admit(StreamEvent::Content { text: "".into() }).is_ok());
        }
        let fatal = gate
            .admit(StreamEvent::Content { text: "".into() })
            .unwrap_err();
        assert_eq!(fatal.0, MAX_CONSECUTIVE_MALFORMED);
    }
}
