//! Fault handlers - structured recovery for mediation errors
//!
//! Each MessageContext owns a LIFO stack of fault handlers. Sequences push a
//! handler before executing their children and pop it afterwards only if it
//! is still the top of the stack; a handler consumed by a nested failure
//! stays consumed.

use std::sync::Arc;

use tracing::{error, warn};

use crate::context::MessageContext;
use crate::error::MediationError;
use crate::mediator::Mediator;

/// A recovery handler invoked when mediation of an enclosing scope fails.
pub trait FaultHandler: Send + Sync {
    fn handle_fault(&self, ctx: &mut MessageContext, error: &MediationError);
}

/// Adapter wrapping a single mediator as a fault handler. Purely a type
/// bridge: `handle_fault` re-invokes `mediate` on the wrapped mediator.
pub struct MediatorFaultHandler {
    mediator: Arc<dyn Mediator>,
}

impl MediatorFaultHandler {
    pub fn new(mediator: Arc<dyn Mediator>) -> Self {
        Self { mediator }
    }
}

impl FaultHandler for MediatorFaultHandler {
    fn handle_fault(&self, ctx: &mut MessageContext, error: &MediationError) {
        warn!(
            message_id = %ctx.id(),
            error = %error,
            "Executing fault handler"
        );
        if let Err(e) = self.mediator.mediate(ctx) {
            // A failing fault handler has nowhere left to go.
            error!(
                message_id = %ctx.id(),
                error = %e,
                "Fault handler itself failed"
            );
        }
    }
}
