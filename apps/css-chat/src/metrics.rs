use metrics::{counter, gauge};

use crate::connection::WakeOutcome;
use crate::registry::FanoutReport;

pub fn record_connection_opened(active: usize) {
    counter!("css_chat_connections_total", 1);
    gauge!("css_chat_connections_active", active as f64);
}

pub fn record_connection_closed(active: usize) {
    gauge!("css_chat_connections_active", active as f64);
}

pub fn record_published(kind: &'static str, evicted: usize) {
    counter!("css_chat_messages_published_total", 1, "kind" => kind);
    if evicted > 0 {
        counter!("css_chat_messages_evicted_total", evicted as u64);
    }
}

pub fn record_fanout(report: &FanoutReport) {
    for (outcome, count) in [
        (WakeOutcome::Delivered, report.delivered),
        (WakeOutcome::Coalesced, report.coalesced),
        (WakeOutcome::Closed, report.closed),
    ] {
        if count > 0 {
            counter!(
                "css_chat_wakes_total",
                count as u64,
                "outcome" => outcome.metric_label()
            );
        }
    }
}

pub fn record_self_wake(outcome: WakeOutcome) {
    counter!(
        "css_chat_wakes_total",
        1,
        "outcome" => outcome.metric_label()
    );
}

pub fn record_chunk_emitted() {
    counter!("css_chat_chunks_emitted_total", 1);
}

pub fn record_interaction(action: &'static str) {
    counter!("css_chat_interactions_total", 1, "action" => action);
}

pub fn record_rejection(action: &'static str, reason: &'static str) {
    counter!(
        "css_chat_interactions_rejected_total",
        1,
        "action" => action,
        "reason" => reason
    );
}
