//! MediationConfig - the named-sequence registry
//!
//! Built once at startup and passed by `Arc` to every component that needs
//! lookup. There is no global registry; tests construct fixtures directly.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::error::MediationError;
use crate::sequence::SequenceMediator;
use crate::Result;

pub struct MediationConfig {
    sequences: HashMap<String, Arc<SequenceMediator>>,
    main: Arc<SequenceMediator>,
}

impl MediationConfig {
    pub fn builder() -> MediationConfigBuilder {
        MediationConfigBuilder {
            sequences: HashMap::new(),
            main: None,
        }
    }

    pub fn resolve_sequence(&self, name: &str) -> Option<Arc<SequenceMediator>> {
        self.sequences.get(name).cloned()
    }

    pub fn main_sequence(&self) -> Arc<SequenceMediator> {
        self.main.clone()
    }

    pub fn sequence_names(&self) -> Vec<String> {
        self.sequences.keys().cloned().collect()
    }

    /// Tear down every registered sequence and the main sequence.
    pub fn destroy(&self) {
        use crate::mediator::Mediator;
        for sequence in self.sequences.values() {
            sequence.destroy();
        }
        self.main.destroy();
    }
}

pub struct MediationConfigBuilder {
    sequences: HashMap<String, Arc<SequenceMediator>>,
    main: Option<Arc<SequenceMediator>>,
}

impl MediationConfigBuilder {
    /// Register a named sequence. The sequence must carry a name and names
    /// must be unique within the configuration.
    pub fn sequence(mut self, sequence: SequenceMediator) -> Result<Self> {
        let name = sequence
            .name()
            .ok_or_else(|| {
                MediationError::Config("registered sequences must be named".to_string())
            })?
            .to_string();
        if self.sequences.contains_key(&name) {
            return Err(MediationError::Config(format!(
                "duplicate sequence name '{}'",
                name
            )));
        }
        self.sequences.insert(name, Arc::new(sequence));
        Ok(self)
    }

    pub fn main(mut self, sequence: SequenceMediator) -> Self {
        self.main = Some(Arc::new(sequence));
        self
    }

    /// Validate references, initialize every sequence, and freeze the
    /// configuration.
    pub fn build(self) -> Result<Arc<MediationConfig>> {
        use crate::mediator::Mediator;

        let main = self
            .main
            .ok_or_else(|| MediationError::Config("main sequence is required".to_string()))?;

        // Error-handler references must resolve at build time.
        for sequence in self.sequences.values().chain(std::iter::once(&main)) {
            if let Some(handler) = sequence.error_handler_name() {
                if !self.sequences.contains_key(handler) {
                    return Err(MediationError::Config(format!(
                        "error handler sequence '{}' is not registered",
                        handler
                    )));
                }
            }
        }

        let config = MediationConfig {
            sequences: self.sequences,
            main,
        };

        for sequence in config.sequences.values() {
            sequence.init(&config);
        }
        config.main.init(&config);

        info!(
            sequences = config.sequences.len(),
            "Mediation configuration built"
        );
        Ok(Arc::new(config))
    }
}
