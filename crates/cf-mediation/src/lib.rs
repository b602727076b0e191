//! CrossFlow Mediation Pipeline
//!
//! This crate provides the message mediation engine with:
//! - MessageContext: per-message mutable state with scoped properties and a fault-handler stack
//! - Mediator: the composable `mediate(ctx) -> continue?` pipeline contract
//! - SequenceMediator: named/anonymous ordered mediator lists with error-handler scoping
//! - FilterMediator / SwitchMediator: conditional branching with full-match pattern semantics
//! - CloneMediator / IterateMediator: fan-out into independent message contexts
//! - MediatorWorker: asynchronous injection of a context onto the blocking pool
//! - MediationConfig: the named-sequence registry, built once and passed by reference

pub mod builtin;
pub mod clone_mediator;
pub mod config;
pub mod context;
pub mod error;
pub mod fault;
pub mod filter;
pub mod iterate;
pub mod mediator;
pub mod sequence;
pub mod stats;
pub mod switch;
pub mod worker;

pub use builtin::{DropMediator, FaultMediator, LogMediator, PropertyMediator};
pub use clone_mediator::{CloneMediator, CloneTarget};
pub use config::{MediationConfig, MediationConfigBuilder};
pub use context::{MessageContext, PropertyScope, TracingState, MESSAGE_SEQUENCE_PROPERTY};
pub use error::MediationError;
pub use fault::{FaultHandler, MediatorFaultHandler};
pub use filter::{FilterMediator, FilterPredicate};
pub use iterate::IterateMediator;
pub use mediator::{mediate_children, Mediator};
pub use sequence::{SequenceKey, SequenceMediator};
pub use switch::{SwitchCase, SwitchMediator};
pub use worker::MediatorWorker;

pub type Result<T> = std::result::Result<T, MediationError>;
