//! The Mediator contract and the list-mediator child execution helper.

use std::sync::Arc;

use tracing::debug;

use crate::config::MediationConfig;
use crate::context::MessageContext;
use crate::error::MediationError;
use crate::Result;

/// The unit of pipeline work.
///
/// `mediate` returns `Ok(true)` to continue the enclosing pipeline,
/// `Ok(false)` to stop further mediation of this context along this path,
/// and `Err` for a mediation failure to be recovered by the context's
/// fault-handler stack.
pub trait Mediator: Send + Sync {
    fn mediate(&self, ctx: &mut MessageContext) -> Result<bool>;

    /// Short name used in logs and statistics.
    fn mediator_name(&self) -> &str {
        "mediator"
    }

    /// Called once when the enclosing configuration is initialized.
    fn init(&self, _config: &MediationConfig) {}

    /// Called once when the enclosing configuration is torn down.
    fn destroy(&self) {}
}

/// Execute `children` in insertion order under the list-mediator contract:
/// short-circuit on the first `Ok(false)`, and route an `Err` from any child
/// to the active fault handler (top of the context's stack). After the
/// handler completes the failure counts as `Ok(false)` to the caller; with
/// an empty stack the error propagates.
pub fn mediate_children(children: &[Arc<dyn Mediator>], ctx: &mut MessageContext) -> Result<bool> {
    for child in children {
        match child.mediate(ctx) {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    message_id = %ctx.id(),
                    mediator = child.mediator_name(),
                    "Mediator stopped further processing"
                );
                return Ok(false);
            }
            Err(e) => return recover(ctx, e),
        }
    }
    Ok(true)
}

fn recover(ctx: &mut MessageContext, error: MediationError) -> Result<bool> {
    match ctx.pop_fault_handler() {
        Some(handler) => {
            handler.handle_fault(ctx, &error);
            Ok(false)
        }
        None => Err(error),
    }
}

/// Initialize every child against `config`.
pub fn init_children(children: &[Arc<dyn Mediator>], config: &MediationConfig) {
    for child in children {
        child.init(config);
    }
}

/// Tear down every child.
pub fn destroy_children(children: &[Arc<dyn Mediator>]) {
    for child in children {
        child.destroy();
    }
}
