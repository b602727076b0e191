//! MessageContext - per-message mutable state
//!
//! A context is owned by exactly one thread at a time. Branching mediators
//! (clone/iterate) create fully independent copies; siblings share nothing
//! mutable.

use std::collections::HashMap;
use std::sync::Arc;

use cf_common::Envelope;
use serde_json::Value;
use uuid::Uuid;

use crate::config::MediationConfig;
use crate::fault::FaultHandler;

/// Property set on fan-out branches recording their `i/N` position.
pub const MESSAGE_SEQUENCE_PROPERTY: &str = "message.sequence";

/// Property scopes for the context property bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyScope {
    /// Mediation-level properties (the default scope)
    Default,
    /// Transport headers and transport-level hints
    Transport,
    /// Engine/system properties
    System,
}

/// Per-context tracing override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingState {
    Unset,
    On,
    Off,
}

/// Mutable state for one in-flight message.
pub struct MessageContext {
    id: Uuid,
    envelope: Envelope,
    properties: HashMap<PropertyScope, HashMap<String, Value>>,
    fault_stack: Vec<Arc<dyn FaultHandler>>,
    tracing_state: TracingState,
    response: bool,
    fault_response: bool,
    response_suppressed: bool,
    config: Arc<MediationConfig>,
}

impl MessageContext {
    pub fn new(envelope: Envelope, config: Arc<MediationConfig>) -> Self {
        Self {
            id: Uuid::new_v4(),
            envelope,
            properties: HashMap::new(),
            fault_stack: Vec::new(),
            tracing_state: TracingState::Unset,
            response: false,
            fault_response: false,
            response_suppressed: false,
            config,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    pub fn set_envelope(&mut self, envelope: Envelope) {
        self.envelope = envelope;
    }

    pub fn config(&self) -> Arc<MediationConfig> {
        self.config.clone()
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    pub fn set_property(&mut self, scope: PropertyScope, key: impl Into<String>, value: Value) {
        self.properties
            .entry(scope)
            .or_default()
            .insert(key.into(), value);
    }

    pub fn get_property(&self, scope: PropertyScope, key: &str) -> Option<&Value> {
        self.properties.get(&scope).and_then(|m| m.get(key))
    }

    pub fn remove_property(&mut self, scope: PropertyScope, key: &str) -> Option<Value> {
        self.properties.get_mut(&scope).and_then(|m| m.remove(key))
    }

    pub fn property_count(&self, scope: PropertyScope) -> usize {
        self.properties.get(&scope).map(|m| m.len()).unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Fault-handler stack
    // ------------------------------------------------------------------

    pub fn push_fault_handler(&mut self, handler: Arc<dyn FaultHandler>) {
        self.fault_stack.push(handler);
    }

    /// Pop and return the active fault handler, if any.
    pub fn pop_fault_handler(&mut self) -> Option<Arc<dyn FaultHandler>> {
        self.fault_stack.pop()
    }

    /// Pop `handler` only if it is still the top of the stack. A handler
    /// consumed or replaced by a nested frame must not be popped again.
    pub fn pop_fault_handler_if_top(&mut self, handler: &Arc<dyn FaultHandler>) -> bool {
        let is_top = self
            .fault_stack
            .last()
            .map(|top| Arc::ptr_eq(top, handler))
            .unwrap_or(false);
        if is_top {
            self.fault_stack.pop();
        }
        is_top
    }

    pub fn fault_stack_depth(&self) -> usize {
        self.fault_stack.len()
    }

    // ------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------

    pub fn tracing_state(&self) -> TracingState {
        self.tracing_state
    }

    pub fn set_tracing_state(&mut self, state: TracingState) {
        self.tracing_state = state;
    }

    pub fn is_tracing_on(&self) -> bool {
        self.tracing_state == TracingState::On
    }

    pub fn is_response(&self) -> bool {
        self.response
    }

    pub fn set_response(&mut self, response: bool) {
        self.response = response;
    }

    pub fn is_fault_response(&self) -> bool {
        self.fault_response
    }

    pub fn set_fault_response(&mut self, fault: bool) {
        self.fault_response = fault;
    }

    /// Whether the transport-response pathway should skip writing a body for
    /// this context (set when an abandoned parent flow must not produce a
    /// blank response).
    pub fn is_response_suppressed(&self) -> bool {
        self.response_suppressed
    }

    pub fn set_response_suppressed(&mut self, suppressed: bool) {
        self.response_suppressed = suppressed;
    }

    // ------------------------------------------------------------------
    // Branching
    // ------------------------------------------------------------------

    /// Create an independent context for fan-out branch `position` of
    /// `total`. The envelope is deep-copied, properties are copied, and the
    /// branch starts with a fresh fault-handler stack and a new message id.
    pub fn clone_for_branch(&self, position: usize, total: usize) -> Self {
        self.clone_with_envelope(self.envelope.clone(), position, total)
    }

    /// Like [`clone_for_branch`](Self::clone_for_branch) but with a caller
    /// supplied envelope (used by iterate, which builds each branch envelope
    /// from a shared template).
    pub fn clone_with_envelope(&self, envelope: Envelope, position: usize, total: usize) -> Self {
        let mut branch = Self {
            id: Uuid::new_v4(),
            envelope,
            properties: self.properties.clone(),
            fault_stack: Vec::new(),
            tracing_state: self.tracing_state,
            response: self.response,
            fault_response: self.fault_response,
            response_suppressed: false,
            config: self.config.clone(),
        };
        branch.set_property(
            PropertyScope::Default,
            MESSAGE_SEQUENCE_PROPERTY,
            Value::String(format!("{}/{}", position, total)),
        );
        branch
    }
}
