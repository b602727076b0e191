//! IterateMediator - split one message into a stream of per-node messages.

use std::sync::Arc;

use cf_common::PathExpr;
use tracing::debug;

use crate::config::MediationConfig;
use crate::context::MessageContext;
use crate::error::MediationError;
use crate::mediator::Mediator;
use crate::stats;
use crate::Result;

pub struct IterateMediator {
    expression: PathExpr,
    preserve_payload: bool,
    attach_path: Option<PathExpr>,
    target: Arc<dyn Mediator>,
    continue_parent: bool,
}

impl IterateMediator {
    pub fn new(expression: PathExpr, target: Arc<dyn Mediator>) -> Self {
        Self {
            expression,
            preserve_payload: false,
            attach_path: None,
            target,
            continue_parent: true,
        }
    }

    /// Keep the rest of the payload template in every iterated message
    /// instead of starting each from a blank body.
    pub fn preserve_payload(mut self, preserve: bool) -> Self {
        self.preserve_payload = preserve;
        self
    }

    /// Where to attach each split node within the preserved template.
    pub fn attach_path(mut self, path: PathExpr) -> Self {
        self.attach_path = Some(path);
        self
    }

    pub fn continue_parent(mut self, continue_parent: bool) -> Self {
        self.continue_parent = continue_parent;
        self
    }
}

impl Mediator for IterateMediator {
    fn mediate(&self, ctx: &mut MessageContext) -> Result<bool> {
        // One clone of the envelope serves as the shared template; detaching
        // the split results removes them from it.
        let mut template = ctx.envelope().clone();
        let results = self.expression.detach_all(template.body_mut());

        debug!(
            message_id = %ctx.id(),
            expression = %self.expression,
            results = results.len(),
            "Iterating over split results"
        );
        stats::fanout_branches("iterate", results.len());

        if !self.preserve_payload {
            template.clear_body();
        }

        let total = results.len();
        for (index, node) in results.into_iter().enumerate() {
            // Anonymous text nodes cannot stand alone as an iterated message.
            if node.name.is_empty() {
                return Err(MediationError::SplitResultNotElement(
                    self.expression.to_string(),
                ));
            }

            let mut branch = ctx.clone_with_envelope(template.clone(), index + 1, total);
            match &self.attach_path {
                Some(path) => {
                    branch.envelope_mut().attach_at(path, node);
                }
                None => branch.envelope_mut().body_mut().push_child(node),
            }

            // Unlike clone, a failing iteration aborts the split: the error
            // travels to the parent's fault handler.
            self.target.mediate(&mut branch)?;
        }

        if !self.continue_parent {
            // The abandoned parent flow must not emit a blank response.
            ctx.set_response_suppressed(true);
        }
        Ok(self.continue_parent)
    }

    fn mediator_name(&self) -> &str {
        "iterate"
    }

    fn init(&self, config: &MediationConfig) {
        self.target.init(config);
    }

    fn destroy(&self) {
        self.target.destroy();
    }
}
