//! MessageStore - reference messages and MakeConnection templating.

use cf_common::Envelope;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// WS-MakeConnection action for polling requests.
pub const MAKE_CONNECTION_ACTION: &str =
    "http://docs.oasis-open.org/ws-rx/wsmc/200702/MakeConnection";

/// Prefix of the MakeConnection anonymous URI; the suffix is the anonymous
/// id.
pub const ANONYMOUS_URI_PREFIX: &str =
    "http://docs.oasis-open.org/ws-rx/wsmc/200702/anonymous?id=";

/// Extract the anonymous id from an RM-anonymous URI.
pub fn anonymous_uuid(uri: &str) -> Option<&str> {
    uri.strip_prefix(ANONYMOUS_URI_PREFIX)
        .filter(|id| !id.is_empty())
}

/// How a MakeConnection request selects the messages it polls for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollSelector {
    /// RM-anonymous addressing: select by anonymous URI, sequence id omitted
    /// from the wire request.
    Address(String),
    /// Select by explicit sequence id.
    Identifier(String),
}

/// A message held in the store: either a reference message retained from a
/// sequence's traffic, or a polling request built from one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub storage_key: String,
    pub envelope: Envelope,
    pub to: String,
    pub action: String,
    /// False for polling requests so a synchronous reply is processed
    /// rather than ignored as a server-side async case.
    pub server_side: bool,
    pub selector: Option<PollSelector>,
}

impl StoredMessage {
    pub fn reference(envelope: Envelope, to: impl Into<String>) -> Self {
        Self {
            storage_key: Uuid::new_v4().to_string(),
            envelope,
            to: to.into(),
            action: String::new(),
            server_side: true,
            selector: None,
        }
    }

    /// Template a MakeConnection polling request from this message.
    pub fn make_connection(&self, selector: PollSelector) -> Self {
        Self {
            storage_key: Uuid::new_v4().to_string(),
            envelope: self.envelope.clone(),
            to: self.to.clone(),
            action: MAKE_CONNECTION_ACTION.to_string(),
            server_side: false,
            selector: Some(selector),
        }
    }
}

pub trait MessageStore: Send + Sync {
    fn retrieve(&self, key: &str) -> Option<StoredMessage>;
    /// Store a message and return its storage key.
    fn store(&self, message: StoredMessage) -> String;
}

/// Concurrent in-memory message store.
pub struct InMemoryMessageStore {
    messages: DashMap<String, StoredMessage>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self {
            messages: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// All stored MakeConnection requests, for inspection in tests and
    /// monitoring.
    pub fn make_connection_messages(&self) -> Vec<StoredMessage> {
        self.messages
            .iter()
            .filter(|e| e.value().action == MAKE_CONNECTION_ACTION)
            .map(|e| e.value().clone())
            .collect()
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore for InMemoryMessageStore {
    fn retrieve(&self, key: &str) -> Option<StoredMessage> {
        self.messages.get(key).map(|e| e.value().clone())
    }

    fn store(&self, message: StoredMessage) -> String {
        let key = message.storage_key.clone();
        self.messages.insert(key.clone(), message);
        key
    }
}
