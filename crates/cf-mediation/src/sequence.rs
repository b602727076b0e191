//! SequenceMediator - named or anonymous ordered mediator lists
//!
//! A sequence either carries its own child list or is an indirection: a key
//! (static name or runtime-evaluated expression) resolved against the
//! configuration's named-sequence registry at mediation time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use cf_common::PathExpr;
use tracing::{debug, trace};

use crate::config::MediationConfig;
use crate::context::MessageContext;
use crate::error::MediationError;
use crate::fault::{FaultHandler, MediatorFaultHandler};
use crate::mediator::{destroy_children, init_children, mediate_children, Mediator};
use crate::stats;
use crate::Result;

/// How an indirect sequence locates its target in the registry.
#[derive(Debug, Clone)]
pub enum SequenceKey {
    /// A fixed registry name.
    Static(String),
    /// An expression evaluated against the message envelope; the resulting
    /// string is the registry name.
    Dynamic(PathExpr),
}

pub struct SequenceMediator {
    name: Option<String>,
    key: Option<SequenceKey>,
    error_handler: Option<String>,
    children: Vec<Arc<dyn Mediator>>,
    initialized: AtomicBool,
}

impl SequenceMediator {
    /// A named sequence, registrable in a MediationConfig.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            key: None,
            error_handler: None,
            children: Vec::new(),
            initialized: AtomicBool::new(false),
        }
    }

    /// An anonymous inline sequence.
    pub fn anonymous() -> Self {
        Self {
            name: None,
            key: None,
            error_handler: None,
            children: Vec::new(),
            initialized: AtomicBool::new(false),
        }
    }

    /// An indirection to another registered sequence.
    pub fn reference(key: SequenceKey) -> Self {
        Self {
            name: None,
            key: Some(key),
            error_handler: None,
            children: Vec::new(),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn error_handler(mut self, name: impl Into<String>) -> Self {
        self.error_handler = Some(name.into());
        self
    }

    pub fn child(mut self, mediator: impl Mediator + 'static) -> Self {
        self.children.push(Arc::new(mediator));
        self
    }

    pub fn child_arc(mut self, mediator: Arc<dyn Mediator>) -> Self {
        self.children.push(mediator);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn error_handler_name(&self) -> Option<&str> {
        self.error_handler.as_deref()
    }

    fn stats_name(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }

    fn resolve_key(&self, key: &SequenceKey, ctx: &MessageContext) -> Result<String> {
        match key {
            SequenceKey::Static(name) => Ok(name.clone()),
            SequenceKey::Dynamic(expr) => expr
                .select_string(ctx.envelope().body())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    MediationError::Expression(format!(
                        "sequence key expression '{}' yielded no value",
                        expr
                    ))
                }),
        }
    }
}

impl Mediator for SequenceMediator {
    fn mediate(&self, ctx: &mut MessageContext) -> Result<bool> {
        if let Some(key) = &self.key {
            let name = self.resolve_key(key, ctx)?;
            let resolved = ctx
                .config()
                .resolve_sequence(&name)
                .ok_or_else(|| MediationError::SequenceNotFound(name.clone()))?;
            debug!(message_id = %ctx.id(), sequence = %name, "Delegating to referenced sequence");
            return resolved.mediate(ctx);
        }

        let started = Instant::now();
        stats::sequence_started(self.stats_name());
        if ctx.is_tracing_on() {
            trace!(
                message_id = %ctx.id(),
                sequence = self.stats_name(),
                "Start sequence"
            );
        }

        let pushed: Option<Arc<dyn FaultHandler>> = match &self.error_handler {
            Some(handler_name) => {
                let handler_seq = ctx
                    .config()
                    .resolve_sequence(handler_name)
                    .ok_or_else(|| MediationError::SequenceNotFound(handler_name.clone()))?;
                let handler: Arc<dyn FaultHandler> =
                    Arc::new(MediatorFaultHandler::new(handler_seq));
                ctx.push_fault_handler(handler.clone());
                Some(handler)
            }
            None => None,
        };

        let result = mediate_children(&self.children, ctx);

        // A handler consumed by a nested failure is not ours to pop anymore.
        if let Some(handler) = &pushed {
            ctx.pop_fault_handler_if_top(handler);
        }

        stats::sequence_completed(self.stats_name(), started, matches!(result, Ok(true)));
        if ctx.is_tracing_on() {
            trace!(
                message_id = %ctx.id(),
                sequence = self.stats_name(),
                "End sequence"
            );
        }
        result
    }

    fn mediator_name(&self) -> &str {
        self.stats_name()
    }

    fn init(&self, config: &MediationConfig) {
        // Shared named sequences may be initialized from multiple reference
        // sites; only the first call runs the cascade.
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(sequence = self.stats_name(), "Initializing sequence");
        init_children(&self.children, config);
    }

    fn destroy(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return;
        }
        debug!(sequence = self.stats_name(), "Destroying sequence");
        destroy_children(&self.children);
    }
}
