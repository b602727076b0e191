//! Statistics hooks for the mediation pipeline.
//!
//! Informational only: nothing here affects control flow, and no caller may
//! depend on these events for correctness.

use std::time::Instant;

use metrics::{counter, histogram};

pub(crate) fn sequence_started(name: &str) {
    counter!("cf_sequence_invocations_total", "sequence" => name.to_string()).increment(1);
}

pub(crate) fn sequence_completed(name: &str, started: Instant, continued: bool) {
    histogram!("cf_sequence_duration_seconds", "sequence" => name.to_string())
        .record(started.elapsed().as_secs_f64());
    if !continued {
        counter!("cf_sequence_stopped_total", "sequence" => name.to_string()).increment(1);
    }
}

pub(crate) fn fanout_branches(mediator: &'static str, count: usize) {
    counter!("cf_fanout_branches_total", "mediator" => mediator).increment(count as u64);
}
