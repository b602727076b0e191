//! Persisted reliable-messaging sequence state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::acks::RangeSet;

/// Outbound (source) sequence state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RmsBean {
    /// Wire-level sequence id, assigned by the protocol handshake.
    pub sequence_id: Option<String>,
    /// Correlator used before the wire id is known.
    pub internal_sequence_id: String,
    pub polling_mode: bool,
    pub terminated: bool,
    /// Next message number to assign; -1 until the first send.
    pub next_message_number: i64,
    /// Message numbers the peer has acknowledged.
    pub client_completed_messages: RangeSet,
    /// Replies still expected for request-response exchanges.
    pub expected_replies: u64,
    /// Storage key of the reference message used to template polls.
    pub reference_message_key: Option<String>,
    pub reply_to: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RmsBean {
    pub fn new(internal_sequence_id: impl Into<String>) -> Self {
        Self {
            sequence_id: None,
            internal_sequence_id: internal_sequence_id.into(),
            polling_mode: false,
            terminated: false,
            next_message_number: -1,
            client_completed_messages: RangeSet::new(),
            expected_replies: 0,
            reference_message_key: None,
            reply_to: None,
            created_at: Utc::now(),
        }
    }
}

/// Inbound (destination) sequence state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RmdBean {
    pub sequence_id: String,
    pub polling_mode: bool,
    pub terminated: bool,
    pub reply_to: Option<String>,
    pub reference_message_key: Option<String>,
    /// Internal id of the correlated outbound sequence, when this inbound
    /// sequence carries replies for a request-response exchange.
    pub outbound_internal_sequence: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RmdBean {
    pub fn new(sequence_id: impl Into<String>) -> Self {
        Self {
            sequence_id: sequence_id.into(),
            polling_mode: false,
            terminated: false,
            reply_to: None,
            reference_message_key: None,
            outbound_internal_sequence: None,
            created_at: Utc::now(),
        }
    }
}

/// Message kinds tracked in the send queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Application,
    MakeConnection,
}

/// A record in the reliable send queue. The sender subsystem transmits it
/// once the qualification gate opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderBean {
    pub message_id: String,
    /// Storage key of the message to transmit.
    pub message_storage_key: String,
    pub sequence_id: Option<String>,
    pub is_rm_source: bool,
    pub to_address: String,
    pub message_type: MessageType,
    /// Qualification gate: false until the sender subsystem may transmit.
    pub send: bool,
    pub time_to_send: DateTime<Utc>,
}

/// Identifies a sequence for polling: the unit of round-robin selection and
/// of the forced-poll request queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub sequence_id: String,
    pub is_rm_source: bool,
}

impl SequenceEntry {
    pub fn new(sequence_id: impl Into<String>, is_rm_source: bool) -> Self {
        Self {
            sequence_id: sequence_id.into(),
            is_rm_source,
        }
    }
}

// ============================================================================
// Find-unique templates
// ============================================================================

/// Match template for RMS bean lookups; `None` fields match anything.
#[derive(Debug, Clone, Default)]
pub struct RmsBeanTemplate {
    pub internal_sequence_id: Option<String>,
    pub sequence_id: Option<String>,
    pub polling_mode: Option<bool>,
    pub terminated: Option<bool>,
}

impl RmsBeanTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn internal_sequence_id(mut self, id: impl Into<String>) -> Self {
        self.internal_sequence_id = Some(id.into());
        self
    }

    pub fn polling_mode(mut self, polling: bool) -> Self {
        self.polling_mode = Some(polling);
        self
    }

    pub fn terminated(mut self, terminated: bool) -> Self {
        self.terminated = Some(terminated);
        self
    }

    pub fn matches(&self, bean: &RmsBean) -> bool {
        self.internal_sequence_id
            .as_ref()
            .map(|v| v == &bean.internal_sequence_id)
            .unwrap_or(true)
            && self
                .sequence_id
                .as_ref()
                .map(|v| Some(v) == bean.sequence_id.as_ref())
                .unwrap_or(true)
            && self.polling_mode.map(|v| v == bean.polling_mode).unwrap_or(true)
            && self.terminated.map(|v| v == bean.terminated).unwrap_or(true)
    }
}

/// Match template for RMD bean lookups; `None` fields match anything.
#[derive(Debug, Clone, Default)]
pub struct RmdBeanTemplate {
    pub sequence_id: Option<String>,
    pub polling_mode: Option<bool>,
    pub terminated: Option<bool>,
}

impl RmdBeanTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sequence_id(mut self, id: impl Into<String>) -> Self {
        self.sequence_id = Some(id.into());
        self
    }

    pub fn polling_mode(mut self, polling: bool) -> Self {
        self.polling_mode = Some(polling);
        self
    }

    pub fn terminated(mut self, terminated: bool) -> Self {
        self.terminated = Some(terminated);
        self
    }

    pub fn matches(&self, bean: &RmdBean) -> bool {
        self.sequence_id
            .as_ref()
            .map(|v| v == &bean.sequence_id)
            .unwrap_or(true)
            && self.polling_mode.map(|v| v == bean.polling_mode).unwrap_or(true)
            && self.terminated.map(|v| v == bean.terminated).unwrap_or(true)
    }
}
