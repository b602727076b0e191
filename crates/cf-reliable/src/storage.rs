//! StorageManager / Transaction - transactional access to sequence beans.
//!
//! The polling engine treats storage as an injected dependency. The
//! in-memory implementation here backs tests and embedded deployments;
//! durable backends implement the same traits.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::beans::{RmdBean, RmdBeanTemplate, RmsBean, RmsBeanTemplate, SenderBean};
use crate::error::ReliableError;
use crate::Result;

/// A storage transaction. Commit consumes the transaction; a transaction
/// dropped while still active rolls back.
pub trait Transaction: Send {
    fn commit(self: Box<Self>) -> Result<()>;
    fn rollback(self: Box<Self>);
    fn is_active(&self) -> bool;
}

pub trait RmsBeanManager: Send + Sync {
    /// The single bean matching `template`, or `None`. More than one match
    /// is a storage error.
    fn find_unique(&self, template: &RmsBeanTemplate) -> Result<Option<RmsBean>>;
    fn insert(&self, bean: RmsBean) -> Result<()>;
    fn update(&self, bean: RmsBean) -> Result<()>;
}

pub trait RmdBeanManager: Send + Sync {
    fn find_unique(&self, template: &RmdBeanTemplate) -> Result<Option<RmdBean>>;
    fn insert(&self, bean: RmdBean) -> Result<()>;
    fn update(&self, bean: RmdBean) -> Result<()>;
}

pub trait SenderBeanManager: Send + Sync {
    fn insert(&self, bean: SenderBean) -> Result<()>;
    fn list(&self) -> Result<Vec<SenderBean>>;
}

pub trait StorageManager: Send + Sync {
    fn begin_transaction(&self) -> Box<dyn Transaction>;
    fn rms_beans(&self) -> &dyn RmsBeanManager;
    fn rmd_beans(&self) -> &dyn RmdBeanManager;
    fn sender_beans(&self) -> &dyn SenderBeanManager;
}

// ============================================================================
// In-memory implementation
// ============================================================================

#[derive(Debug, Clone, Default)]
struct Tables {
    rms: Vec<RmsBean>,
    rmd: Vec<RmdBean>,
    senders: Vec<SenderBean>,
}

type SharedTables = Arc<RwLock<Tables>>;

/// In-memory storage. Transactions snapshot the tables on begin and restore
/// the snapshot on rollback; writers are expected to serialize through one
/// transaction at a time (the polling loop is this crate's only writer).
pub struct InMemoryStorageManager {
    tables: SharedTables,
    rms_manager: InMemoryRmsBeanManager,
    rmd_manager: InMemoryRmdBeanManager,
    sender_manager: InMemorySenderBeanManager,
}

impl InMemoryStorageManager {
    pub fn new() -> Self {
        let tables: SharedTables = Arc::new(RwLock::new(Tables::default()));
        Self {
            rms_manager: InMemoryRmsBeanManager {
                tables: tables.clone(),
            },
            rmd_manager: InMemoryRmdBeanManager {
                tables: tables.clone(),
            },
            sender_manager: InMemorySenderBeanManager {
                tables: tables.clone(),
            },
            tables,
        }
    }
}

impl Default for InMemoryStorageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageManager for InMemoryStorageManager {
    fn begin_transaction(&self) -> Box<dyn Transaction> {
        let snapshot = self.tables.read().clone();
        Box::new(InMemoryTransaction {
            tables: self.tables.clone(),
            snapshot: Some(snapshot),
        })
    }

    fn rms_beans(&self) -> &dyn RmsBeanManager {
        &self.rms_manager
    }

    fn rmd_beans(&self) -> &dyn RmdBeanManager {
        &self.rmd_manager
    }

    fn sender_beans(&self) -> &dyn SenderBeanManager {
        &self.sender_manager
    }
}

struct InMemoryTransaction {
    tables: SharedTables,
    /// Present while the transaction is active.
    snapshot: Option<Tables>,
}

impl InMemoryTransaction {
    fn restore(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.tables.write() = snapshot;
        }
    }
}

impl Transaction for InMemoryTransaction {
    fn commit(mut self: Box<Self>) -> Result<()> {
        if self.snapshot.take().is_none() {
            return Err(ReliableError::Transaction(
                "transaction is no longer active".to_string(),
            ));
        }
        debug!("Transaction committed");
        Ok(())
    }

    fn rollback(mut self: Box<Self>) {
        self.restore();
        debug!("Transaction rolled back");
    }

    fn is_active(&self) -> bool {
        self.snapshot.is_some()
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if self.snapshot.is_some() {
            warn!("Transaction dropped while active, rolling back");
            self.restore();
        }
    }
}

struct InMemoryRmsBeanManager {
    tables: SharedTables,
}

impl RmsBeanManager for InMemoryRmsBeanManager {
    fn find_unique(&self, template: &RmsBeanTemplate) -> Result<Option<RmsBean>> {
        let tables = self.tables.read();
        let mut matches = tables.rms.iter().filter(|b| template.matches(b));
        let first = matches.next().cloned();
        if matches.next().is_some() {
            return Err(ReliableError::Storage(format!(
                "non-unique RMS bean match for template {:?}",
                template
            )));
        }
        Ok(first)
    }

    fn insert(&self, bean: RmsBean) -> Result<()> {
        self.tables.write().rms.push(bean);
        Ok(())
    }

    fn update(&self, bean: RmsBean) -> Result<()> {
        let mut tables = self.tables.write();
        match tables
            .rms
            .iter_mut()
            .find(|b| b.internal_sequence_id == bean.internal_sequence_id)
        {
            Some(existing) => {
                *existing = bean;
                Ok(())
            }
            None => Err(ReliableError::Storage(format!(
                "no RMS bean with internal sequence id '{}'",
                bean.internal_sequence_id
            ))),
        }
    }
}

struct InMemoryRmdBeanManager {
    tables: SharedTables,
}

impl RmdBeanManager for InMemoryRmdBeanManager {
    fn find_unique(&self, template: &RmdBeanTemplate) -> Result<Option<RmdBean>> {
        let tables = self.tables.read();
        let mut matches = tables.rmd.iter().filter(|b| template.matches(b));
        let first = matches.next().cloned();
        if matches.next().is_some() {
            return Err(ReliableError::Storage(format!(
                "non-unique RMD bean match for template {:?}",
                template
            )));
        }
        Ok(first)
    }

    fn insert(&self, bean: RmdBean) -> Result<()> {
        self.tables.write().rmd.push(bean);
        Ok(())
    }

    fn update(&self, bean: RmdBean) -> Result<()> {
        let mut tables = self.tables.write();
        match tables
            .rmd
            .iter_mut()
            .find(|b| b.sequence_id == bean.sequence_id)
        {
            Some(existing) => {
                *existing = bean;
                Ok(())
            }
            None => Err(ReliableError::Storage(format!(
                "no RMD bean with sequence id '{}'",
                bean.sequence_id
            ))),
        }
    }
}

struct InMemorySenderBeanManager {
    tables: SharedTables,
}

impl SenderBeanManager for InMemorySenderBeanManager {
    fn insert(&self, bean: SenderBean) -> Result<()> {
        self.tables.write().senders.push(bean);
        Ok(())
    }

    fn list(&self) -> Result<Vec<SenderBean>> {
        Ok(self.tables.read().senders.clone())
    }
}
