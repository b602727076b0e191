//! Leaf mediators: log, property set/remove, drop, fault.

use cf_common::Node;
use serde_json::Value;
use tracing::info;

use crate::context::{MessageContext, PropertyScope};
use crate::mediator::Mediator;
use crate::Result;

/// Emits a structured log line for the passing message and continues.
pub struct LogMediator {
    message: Option<String>,
}

impl LogMediator {
    pub fn new() -> Self {
        Self { message: None }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}

impl Default for LogMediator {
    fn default() -> Self {
        Self::new()
    }
}

impl Mediator for LogMediator {
    fn mediate(&self, ctx: &mut MessageContext) -> Result<bool> {
        info!(
            message_id = %ctx.id(),
            properties = ctx.property_count(PropertyScope::Default),
            message = self.message.as_deref().unwrap_or(""),
            "Log mediator"
        );
        Ok(true)
    }

    fn mediator_name(&self) -> &str {
        "log"
    }
}

/// Sets or removes one scoped property.
pub struct PropertyMediator {
    scope: PropertyScope,
    name: String,
    /// `Some` sets the property, `None` removes it.
    value: Option<Value>,
}

impl PropertyMediator {
    pub fn set(scope: PropertyScope, name: impl Into<String>, value: Value) -> Self {
        Self {
            scope,
            name: name.into(),
            value: Some(value),
        }
    }

    pub fn remove(scope: PropertyScope, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
            value: None,
        }
    }
}

impl Mediator for PropertyMediator {
    fn mediate(&self, ctx: &mut MessageContext) -> Result<bool> {
        match &self.value {
            Some(value) => ctx.set_property(self.scope, self.name.clone(), value.clone()),
            None => {
                ctx.remove_property(self.scope, &self.name);
            }
        }
        Ok(true)
    }

    fn mediator_name(&self) -> &str {
        "property"
    }
}

/// Stops mediation of the current path.
pub struct DropMediator;

impl Mediator for DropMediator {
    fn mediate(&self, _ctx: &mut MessageContext) -> Result<bool> {
        Ok(false)
    }

    fn mediator_name(&self) -> &str {
        "drop"
    }
}

/// Marks the context as a fault response and replaces the body with a fault
/// node carrying the configured reason.
pub struct FaultMediator {
    reason: String,
}

impl FaultMediator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Mediator for FaultMediator {
    fn mediate(&self, ctx: &mut MessageContext) -> Result<bool> {
        ctx.set_fault_response(true);
        let envelope = ctx.envelope_mut();
        envelope.clear_body();
        envelope
            .body_mut()
            .push_child(Node::new("fault").child(Node::with_text("reason", self.reason.clone())));
        Ok(true)
    }

    fn mediator_name(&self) -> &str {
        "fault"
    }
}
