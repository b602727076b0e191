//! CrossFlow Reliable Messaging
//!
//! This crate provides the reliable-messaging sequence engine with:
//! - RmsBean / RmdBean: persisted outbound and inbound sequence state
//! - RangeSet + acknowledgement completeness checks
//! - StorageManager / Transaction: transactional bean access with an in-memory implementation
//! - MessageStore: reference-message storage for MakeConnection templating
//! - PollingManager: the background round-robin / forced polling loop
//! - SequenceSupervisor: the stop-tracking signal for ended sequences

pub mod acks;
pub mod beans;
pub mod error;
pub mod polling;
pub mod storage;
pub mod store;

pub use acks::{is_complete, violates_window, RangeSet};
pub use beans::{
    MessageType, RmdBean, RmdBeanTemplate, RmsBean, RmsBeanTemplate, SenderBean, SequenceEntry,
};
pub use error::ReliableError;
pub use polling::{PollingManager, SequenceSupervisor, POLLING_INTERVAL};
pub use storage::{
    InMemoryStorageManager, RmdBeanManager, RmsBeanManager, SenderBeanManager, StorageManager,
    Transaction,
};
pub use store::{
    anonymous_uuid, InMemoryMessageStore, MessageStore, PollSelector, StoredMessage,
    ANONYMOUS_URI_PREFIX, MAKE_CONNECTION_ACTION,
};

pub type Result<T> = std::result::Result<T, ReliableError>;
