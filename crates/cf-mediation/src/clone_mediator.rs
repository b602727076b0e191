//! CloneMediator - fan-out a message to multiple targets, no join.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::MediationConfig;
use crate::context::{MessageContext, PropertyScope};
use crate::mediator::Mediator;
use crate::stats;
use crate::Result;

/// Property carrying the endpoint address a branch should be sent to; the
/// transport senders that consume it live outside this crate.
pub const TARGET_ENDPOINT_PROPERTY: &str = "target.endpoint";

pub struct CloneTarget {
    sequence: Arc<dyn Mediator>,
    endpoint: Option<String>,
}

impl CloneTarget {
    pub fn new(sequence: Arc<dyn Mediator>) -> Self {
        Self {
            sequence,
            endpoint: None,
        }
    }

    pub fn endpoint(mut self, address: impl Into<String>) -> Self {
        self.endpoint = Some(address.into());
        self
    }
}

pub struct CloneMediator {
    targets: Vec<CloneTarget>,
    continue_parent: bool,
}

impl CloneMediator {
    pub fn new(continue_parent: bool) -> Self {
        Self {
            targets: Vec::new(),
            continue_parent,
        }
    }

    pub fn target(mut self, target: CloneTarget) -> Self {
        self.targets.push(target);
        self
    }
}

impl Mediator for CloneMediator {
    fn mediate(&self, ctx: &mut MessageContext) -> Result<bool> {
        let total = self.targets.len();
        debug!(message_id = %ctx.id(), targets = total, "Cloning message");
        stats::fanout_branches("clone", total);

        for (index, target) in self.targets.iter().enumerate() {
            let mut branch = ctx.clone_for_branch(index + 1, total);
            if let Some(endpoint) = &target.endpoint {
                branch.set_property(
                    PropertyScope::Default,
                    TARGET_ENDPOINT_PROPERTY,
                    Value::String(endpoint.clone()),
                );
            }

            // Fault isolation: one branch failing must not abort its
            // siblings, and the parent never observes branch outcomes.
            match target.sequence.mediate(&mut branch) {
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        message_id = %ctx.id(),
                        branch = index + 1,
                        total = total,
                        error = %e,
                        "Clone branch failed"
                    );
                }
            }
        }

        Ok(self.continue_parent)
    }

    fn mediator_name(&self) -> &str {
        "clone"
    }

    fn init(&self, config: &MediationConfig) {
        for target in &self.targets {
            target.sequence.init(config);
        }
    }

    fn destroy(&self) {
        for target in &self.targets {
            target.sequence.destroy();
        }
    }
}
