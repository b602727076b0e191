//! FilterMediator - conditional execution of a child list.

use std::sync::Arc;

use cf_common::PathExpr;
use regex::Regex;
use tracing::debug;

use crate::config::MediationConfig;
use crate::context::MessageContext;
use crate::error::MediationError;
use crate::mediator::{destroy_children, init_children, mediate_children, Mediator};
use crate::Result;

/// Compile a pattern with whole-string match semantics. Filter and switch
/// patterns must conform the entire extracted value, not a substring.
pub(crate) fn compile_full_match(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{})$", pattern))
        .map_err(|e| MediationError::Config(format!("invalid pattern '{}': {}", pattern, e)))
}

/// The filter condition.
pub enum FilterPredicate {
    /// Structural query evaluated as a boolean (any node matches).
    Exists(PathExpr),
    /// Text extraction compared against a whole-string pattern. A null or
    /// empty source value makes the predicate false, never an error.
    Matches { source: PathExpr, pattern: Regex },
}

impl FilterPredicate {
    pub fn exists(expr: PathExpr) -> Self {
        Self::Exists(expr)
    }

    pub fn matches(source: PathExpr, pattern: &str) -> Result<Self> {
        Ok(Self::Matches {
            source,
            pattern: compile_full_match(pattern)?,
        })
    }

    fn evaluate(&self, ctx: &MessageContext) -> bool {
        match self {
            Self::Exists(expr) => expr.exists(ctx.envelope().body()),
            Self::Matches { source, pattern } => {
                match source.select_string(ctx.envelope().body()) {
                    Some(value) if !value.is_empty() => pattern.is_match(&value),
                    _ => false,
                }
            }
        }
    }
}

pub struct FilterMediator {
    predicate: FilterPredicate,
    children: Vec<Arc<dyn Mediator>>,
}

impl FilterMediator {
    pub fn new(predicate: FilterPredicate) -> Self {
        Self {
            predicate,
            children: Vec::new(),
        }
    }

    pub fn child(mut self, mediator: impl Mediator + 'static) -> Self {
        self.children.push(Arc::new(mediator));
        self
    }

    pub fn child_arc(mut self, mediator: Arc<dyn Mediator>) -> Self {
        self.children.push(mediator);
        self
    }
}

impl Mediator for FilterMediator {
    fn mediate(&self, ctx: &mut MessageContext) -> Result<bool> {
        if self.predicate.evaluate(ctx) {
            mediate_children(&self.children, ctx)
        } else {
            // A false predicate skips the children but does not stop the
            // enclosing pipeline.
            debug!(message_id = %ctx.id(), "Filter predicate false, continuing pipeline");
            Ok(true)
        }
    }

    fn mediator_name(&self) -> &str {
        "filter"
    }

    fn init(&self, config: &MediationConfig) {
        init_children(&self.children, config);
    }

    fn destroy(&self) {
        destroy_children(&self.children);
    }
}
