//! Control messages dispatched from the experiment driver to every device.
//!
//! A message is the single unit of communication on the control plane. It is
//! immutable and value-equal; the coordinator clones it once per registered
//! device queue. The trigger string rendered by [`Message::trigger`] is the
//! exact marker format the reconstruction side parses back out of recordings.

use serde::{Deserialize, Serialize};

/// Predefined message types.
///
/// START marks the beginning of a stimulus, STOP its end, SAVE asks
/// continuous-mode devices for a partial flush mid-session, and TERMINATE is
/// the session-ending poison pill for every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    Start,
    Stop,
    Save,
    Terminate,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Start => "START",
            MessageKind::Stop => "STOP",
            MessageKind::Save => "SAVE",
            MessageKind::Terminate => "TERMINATE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stimulus_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Message {
    /// Informs devices that a stimulus has started.
    pub fn start(experiment_id: &str, stimulus_id: &str) -> Self {
        Message {
            kind: MessageKind::Start,
            experiment_id: Some(experiment_id.to_string()),
            stimulus_id: Some(stimulus_id.to_string()),
            payload: None,
        }
    }

    /// Informs devices that the current stimulus is finished.
    pub fn stop(experiment_id: &str, stimulus_id: &str) -> Self {
        Message {
            kind: MessageKind::Stop,
            experiment_id: Some(experiment_id.to_string()),
            stimulus_id: Some(stimulus_id.to_string()),
            payload: None,
        }
    }

    /// Asks continuous-mode devices to flush buffered data to disk and keep
    /// recording. Useful in long sessions to bound data loss on a crash.
    pub fn save(experiment_id: &str) -> Self {
        Message {
            kind: MessageKind::Save,
            experiment_id: Some(experiment_id.to_string()),
            stimulus_id: None,
            payload: None,
        }
    }

    /// Ends the session. Every worker treats this as a poison pill.
    pub fn terminate() -> Self {
        Message {
            kind: MessageKind::Terminate,
            experiment_id: None,
            stimulus_id: None,
            payload: None,
        }
    }

    /// Renders the inline marker for this message:
    /// `{KIND}-{experiment_id}-{stimulus_id zero-padded to two digits}`.
    ///
    /// The two-digit pad is a format constraint carried through the whole
    /// pipeline; trial numbers above 99 do not round-trip.
    pub fn trigger(&self) -> String {
        format!(
            "{}-{}-{:0>2}",
            self.kind.as_str(),
            self.experiment_id.as_deref().unwrap_or(""),
            self.stimulus_id.as_deref().unwrap_or("")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_zero_pads_stimulus_id() {
        let msg = Message::start("exp10", "7");
        assert_eq!(msg.trigger(), "START-exp10-07");

        let msg = Message::stop("exp10", "12");
        assert_eq!(msg.trigger(), "STOP-exp10-12");
    }

    #[test]
    fn message_round_trips_through_json() {
        let msg = Message::start("exp01", "00");
        let encoded = serde_json::to_string(&msg).unwrap();
        assert!(encoded.contains("\"type\":\"START\""));
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn type_field_is_mandatory() {
        let result: Result<Message, _> = serde_json::from_str(r#"{"experiment_id":"e1"}"#);
        assert!(result.is_err());
    }
}
