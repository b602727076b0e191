//! PollingManager - the background MakeConnection polling loop.
//!
//! Sequences in polling mode cannot receive asynchronous deliveries, so the
//! manager periodically sends MakeConnection requests on their behalf. Each
//! cycle serves at most one sequence: forced requests first, then a
//! round-robin pick over the registered entries, rate-limited per sequence.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::acks::{is_complete, violates_window};
use crate::beans::{MessageType, RmdBeanTemplate, RmsBeanTemplate, SenderBean, SequenceEntry};
use crate::error::ReliableError;
use crate::storage::StorageManager;
use crate::store::{anonymous_uuid, MessageStore, PollSelector};
use crate::Result;

/// Default pause between polling cycles.
pub const POLLING_INTERVAL: Duration = Duration::from_millis(3000);

/// Receives the signal that a sequence no longer exists in storage and
/// should stop being tracked elsewhere (timers, dispatch tables).
pub trait SequenceSupervisor: Send + Sync {
    fn stop_tracking(&self, sequence_id: &str, is_rm_source: bool);
}

struct PollState {
    entries: Vec<SequenceEntry>,
    next_index: usize,
    last_poll_times: HashMap<String, Instant>,
}

/// Background poller for sequences in polling mode.
pub struct PollingManager {
    storage: Arc<dyn StorageManager>,
    message_store: Arc<dyn MessageStore>,
    supervisor: Arc<dyn SequenceSupervisor>,
    interval: Duration,
    /// Forced polling requests, served FIFO ahead of the round-robin scan.
    scheduled: Mutex<VecDeque<SequenceEntry>>,
    state: Mutex<PollState>,
    wake: Notify,
    shutdown_tx: broadcast::Sender<()>,
}

impl PollingManager {
    pub fn new(
        storage: Arc<dyn StorageManager>,
        message_store: Arc<dyn MessageStore>,
        supervisor: Arc<dyn SequenceSupervisor>,
    ) -> Self {
        Self::with_interval(storage, message_store, supervisor, POLLING_INTERVAL)
    }

    pub fn with_interval(
        storage: Arc<dyn StorageManager>,
        message_store: Arc<dyn MessageStore>,
        supervisor: Arc<dyn SequenceSupervisor>,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            storage,
            message_store,
            supervisor,
            interval,
            scheduled: Mutex::new(VecDeque::new()),
            state: Mutex::new(PollState {
                entries: Vec::new(),
                next_index: 0,
                last_poll_times: HashMap::new(),
            }),
            wake: Notify::new(),
            shutdown_tx,
        }
    }

    /// Track a sequence for round-robin polling.
    pub fn register_sequence(&self, entry: SequenceEntry) {
        let mut state = self.state.lock();
        if !state.entries.contains(&entry) {
            debug!(sequence_id = %entry.sequence_id, is_rm_source = entry.is_rm_source,
                "Registered sequence for polling");
            state.entries.push(entry);
        }
    }

    pub fn known_sequences(&self) -> Vec<SequenceEntry> {
        self.state.lock().entries.clone()
    }

    /// Request an immediate poll for a sequence, bypassing the rate limit.
    /// Wakes the loop if it is sleeping.
    pub fn schedule_polling_request(&self, entry: SequenceEntry) {
        self.scheduled.lock().push_back(entry);
        self.wake.notify_one();
    }

    /// Run one polling cycle. Returns true when the loop should sleep for
    /// the polling interval before the next cycle (pass over all entries
    /// complete, or the picked entry was rate-limited away on this tick).
    pub fn internal_run(&self) -> bool {
        counter!("cf_polling_cycles_total").increment(1);

        let forced = self.scheduled.lock().pop_front();
        let (entry, force) = match forced {
            Some(entry) => (entry, true),
            None => {
                let mut state = self.state.lock();
                if state.entries.is_empty() {
                    return true;
                }
                if state.next_index >= state.entries.len() {
                    state.next_index = 0;
                    return true;
                }
                let entry = state.entries[state.next_index].clone();
                state.next_index += 1;

                // Per-sequence rate limit applies only to round-robin picks.
                let now = Instant::now();
                if let Some(last) = state.last_poll_times.get(&entry.sequence_id) {
                    if now.duration_since(*last) < self.interval {
                        return false;
                    }
                }
                state.last_poll_times.insert(entry.sequence_id.clone(), now);
                (entry, false)
            }
        };

        let tx = self.storage.begin_transaction();
        let outcome = if entry.is_rm_source {
            self.poll_rms_side(&entry, force)
        } else {
            self.poll_rmd_side(&entry, force)
        };
        match outcome {
            Ok(()) => {
                if let Err(e) = tx.commit() {
                    error!(sequence_id = %entry.sequence_id, error = %e,
                        "Failed to commit polling transaction");
                }
            }
            Err(e) => {
                error!(sequence_id = %entry.sequence_id, error = %e,
                    "Polling cycle failed, rolling back");
                tx.rollback();
            }
        }
        false
    }

    fn poll_rms_side(&self, entry: &SequenceEntry, force: bool) -> Result<()> {
        let template = RmsBeanTemplate::new()
            .internal_sequence_id(entry.sequence_id.clone())
            .polling_mode(true)
            .terminated(false);
        let bean = match self.storage.rms_beans().find_unique(&template)? {
            Some(bean) => bean,
            None => {
                self.signal_stop_tracking(entry);
                return Ok(());
            }
        };

        if violates_window(&bean.client_completed_messages, bean.next_message_number) {
            warn!(sequence_id = %entry.sequence_id,
                "Acknowledged message number at or beyond the next to assign");
        }

        let mut clean = true;
        if bean.next_message_number > -1 {
            clean = is_complete(&bean.client_completed_messages, bean.next_message_number);
        }

        let sequence_id = match &bean.sequence_id {
            Some(id) => id.clone(),
            // Handshake not finished yet; nothing to poll for.
            None => return Ok(()),
        };
        let reference_key = match &bean.reference_message_key {
            Some(key) => key.clone(),
            None => return Ok(()),
        };

        if force || !clean || bean.expected_replies > 0 {
            self.poll_for_sequence(entry, &sequence_id, &reference_key, bean.reply_to.as_deref())?;
        }
        Ok(())
    }

    fn poll_rmd_side(&self, entry: &SequenceEntry, force: bool) -> Result<()> {
        let template = RmdBeanTemplate::new()
            .sequence_id(entry.sequence_id.clone())
            .polling_mode(true)
            .terminated(false);
        let bean = match self.storage.rmd_beans().find_unique(&template)? {
            Some(bean) => bean,
            None => {
                self.signal_stop_tracking(entry);
                return Ok(());
            }
        };

        // When a correlated outbound sequence is still live and expects no
        // replies, its own polling covers this side; skip unless forced.
        if !force {
            if let Some(outbound_id) = &bean.outbound_internal_sequence {
                let outbound_template =
                    RmsBeanTemplate::new().internal_sequence_id(outbound_id.clone());
                if let Some(outbound) = self.storage.rms_beans().find_unique(&outbound_template)? {
                    if !outbound.terminated && outbound.expected_replies == 0 {
                        return Ok(());
                    }
                }
            }
        }

        let reference_key = match &bean.reference_message_key {
            Some(key) => key.clone(),
            None => return Ok(()),
        };
        self.poll_for_sequence(
            entry,
            &bean.sequence_id,
            &reference_key,
            bean.reply_to.as_deref(),
        )
    }

    /// Build a MakeConnection request from the sequence's reference message
    /// and enqueue it for the sender subsystem.
    fn poll_for_sequence(
        &self,
        entry: &SequenceEntry,
        sequence_id: &str,
        reference_key: &str,
        reply_to: Option<&str>,
    ) -> Result<()> {
        let reference = self.message_store.retrieve(reference_key).ok_or_else(|| {
            ReliableError::Store(format!(
                "reference message '{}' not found for sequence '{}'",
                reference_key, sequence_id
            ))
        })?;

        // RM-anonymous reply addresses select by anonymous URI and omit the
        // sequence id from the request.
        let selector = match reply_to.filter(|uri| anonymous_uuid(uri).is_some()) {
            Some(uri) => PollSelector::Address(uri.to_string()),
            None => PollSelector::Identifier(sequence_id.to_string()),
        };

        let poll_message = reference.make_connection(selector);
        let to_address = poll_message.to.clone();
        let storage_key = self.message_store.store(poll_message);

        let sender_bean = SenderBean {
            message_id: Uuid::new_v4().to_string(),
            message_storage_key: storage_key,
            sequence_id: Some(sequence_id.to_string()),
            is_rm_source: entry.is_rm_source,
            to_address,
            message_type: MessageType::MakeConnection,
            send: false,
            time_to_send: Utc::now(),
        };
        self.storage.sender_beans().insert(sender_bean)?;

        counter!("cf_make_connection_total").increment(1);
        debug!(sequence_id, is_rm_source = entry.is_rm_source, "Queued MakeConnection request");
        Ok(())
    }

    fn signal_stop_tracking(&self, entry: &SequenceEntry) {
        info!(sequence_id = %entry.sequence_id, is_rm_source = entry.is_rm_source,
            "Sequence no longer in storage, signalling stop-tracking");
        self.supervisor
            .stop_tracking(&entry.sequence_id, entry.is_rm_source);

        let mut state = self.state.lock();
        if let Some(pos) = state.entries.iter().position(|e| e == entry) {
            state.entries.remove(pos);
            if pos < state.next_index {
                state.next_index -= 1;
            }
        }
        state.last_poll_times.remove(&entry.sequence_id);
    }

    /// Spawn the polling loop. Runs until `shutdown` is called.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            info!(interval_ms = self.interval.as_millis() as u64, "Polling manager started");
            loop {
                let should_sleep = self.internal_run();
                if should_sleep {
                    tokio::select! {
                        _ = tokio::time::sleep(self.interval) => {}
                        _ = self.wake.notified() => {}
                        _ = shutdown_rx.recv() => break,
                    }
                } else {
                    if shutdown_rx.try_recv().is_ok() {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            }
            info!("Polling manager stopped");
        })
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
