//! MediatorWorker - asynchronous injection of a message context.
//!
//! Moves one independent MessageContext onto the runtime's blocking pool and
//! mediates it there. Nothing is observable from the handoff: errors are
//! reported through the context's fault pathway and structured logs, never
//! allowed to escape or crash the pool.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::context::MessageContext;
use crate::mediator::Mediator;

pub struct MediatorWorker {
    mediator: Option<Arc<dyn Mediator>>,
    ctx: MessageContext,
}

impl MediatorWorker {
    /// Worker bound to the configuration's main sequence.
    pub fn new(ctx: MessageContext) -> Self {
        Self {
            mediator: None,
            ctx,
        }
    }

    /// Worker bound to an explicit mediator.
    pub fn with_mediator(mediator: Arc<dyn Mediator>, ctx: MessageContext) -> Self {
        Self {
            mediator: Some(mediator),
            ctx,
        }
    }

    /// Execute on the current thread. Used directly by tests and by
    /// [`spawn`](Self::spawn) for the pooled path.
    pub fn run(mut self) {
        let mediator: Arc<dyn Mediator> = match self.mediator.take() {
            Some(m) => m,
            None => self.ctx.config().main_sequence(),
        };

        let message_id = self.ctx.id();
        match mediator.mediate(&mut self.ctx) {
            Ok(continued) => {
                debug!(
                    message_id = %message_id,
                    continued = continued,
                    "Worker mediation complete"
                );
            }
            Err(e) => {
                // Top-level failure: give any remaining fault handler a
                // chance, then log. The error stops here.
                if let Some(handler) = self.ctx.pop_fault_handler() {
                    handler.handle_fault(&mut self.ctx, &e);
                } else {
                    error!(
                        message_id = %message_id,
                        error = %e,
                        "Unhandled mediation error in worker"
                    );
                }
            }
        }
    }

    /// Hand the context to the blocking pool.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::task::spawn_blocking(move || self.run())
    }
}
