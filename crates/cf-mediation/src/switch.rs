//! SwitchMediator - evaluate once, dispatch to the first matching case.

use std::sync::Arc;

use cf_common::PathExpr;
use regex::Regex;
use tracing::debug;

use crate::config::MediationConfig;
use crate::context::MessageContext;
use crate::filter::compile_full_match;
use crate::mediator::Mediator;
use crate::Result;

pub struct SwitchCase {
    pattern: Regex,
    sequence: Arc<dyn Mediator>,
}

impl SwitchCase {
    /// `pattern` uses whole-string match semantics.
    pub fn new(pattern: &str, sequence: Arc<dyn Mediator>) -> Result<Self> {
        Ok(Self {
            pattern: compile_full_match(pattern)?,
            sequence,
        })
    }
}

pub struct SwitchMediator {
    source: PathExpr,
    cases: Vec<SwitchCase>,
    default_case: Option<Arc<dyn Mediator>>,
}

impl SwitchMediator {
    pub fn new(source: PathExpr) -> Self {
        Self {
            source,
            cases: Vec::new(),
            default_case: None,
        }
    }

    pub fn case(mut self, case: SwitchCase) -> Self {
        self.cases.push(case);
        self
    }

    pub fn default_case(mut self, sequence: Arc<dyn Mediator>) -> Self {
        self.default_case = Some(sequence);
        self
    }
}

impl Mediator for SwitchMediator {
    fn mediate(&self, ctx: &mut MessageContext) -> Result<bool> {
        // Evaluated exactly once per invocation.
        let value = self.source.select_string(ctx.envelope().body());

        // Null source with an empty case list goes straight to the default.
        // The condition is deliberately on the case list being empty, not on
        // no case having matched.
        if value.is_none() && self.cases.is_empty() {
            if let Some(default) = &self.default_case {
                debug!(
                    message_id = %ctx.id(),
                    source = %self.source,
                    "Switch source is null and no cases configured, executing default"
                );
                return default.mediate(ctx);
            }
        }

        if let Some(value) = &value {
            for (index, case) in self.cases.iter().enumerate() {
                if case.pattern.is_match(value) {
                    debug!(
                        message_id = %ctx.id(),
                        source = %self.source,
                        value = %value,
                        case = index,
                        "Switch case matched"
                    );
                    return case.sequence.mediate(ctx);
                }
            }
        }

        if let Some(default) = &self.default_case {
            debug!(
                message_id = %ctx.id(),
                source = %self.source,
                value = ?value,
                "No switch case matched, executing default"
            );
            return default.mediate(ctx);
        }

        debug!(
            message_id = %ctx.id(),
            source = %self.source,
            value = ?value,
            "No switch case matched and no default configured"
        );
        Ok(true)
    }

    fn mediator_name(&self) -> &str {
        "switch"
    }

    fn init(&self, config: &MediationConfig) {
        for case in &self.cases {
            case.sequence.init(config);
        }
        if let Some(default) = &self.default_case {
            default.init(config);
        }
    }

    fn destroy(&self) {
        for case in &self.cases {
            case.sequence.destroy();
        }
        if let Some(default) = &self.default_case {
            default.destroy();
        }
    }
}
