//! Process-wide pipeline counters.
//!
//! Counters are append-only and shared across invocations through an `Arc`.
//! Exporting them is left to the embedding application.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Answers below this confidence count as low confidence.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Default)]
struct LabeledCounter {
    values: RwLock<BTreeMap<String, AtomicU64>>,
}

impl LabeledCounter {
    fn add(&self, label: &str, amount: u64) {
        if let Some(counter) = self.values.read().get(label) {
            counter.fetch_add(amount, Ordering::Relaxed);
            return;
        }
        self.values
            .write()
            .entry(label.to_string())
            .or_default()
            .fetch_add(amount, Ordering::Relaxed);
    }

    fn snapshot(&self) -> BTreeMap<String, u64> {
        self.values
            .read()
            .iter()
            .map(|(label, counter)| (label.clone(), counter.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Thread-safe pipeline counters.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    agent_execution_total: LabeledCounter,
    agent_execution_duration_ms_total: LabeledCounter,
    fallbacks_total: LabeledCounter,
    status_total: LabeledCounter,
    rag_queries_total: AtomicU64,
    rag_low_confidence_total: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_agent(&self, agent: &str, latency_ms: f64) {
        self.agent_execution_total.add(agent, 1);
        self.agent_execution_duration_ms_total
            .add(agent, latency_ms.max(0.0).round() as u64);
    }

    pub fn record_fallback(&self, stage: &str) {
        self.fallbacks_total.add(stage, 1);
    }

    /// One finished query with its final status and confidence.
    pub fn record_query(&self, status: &str, confidence: f64) {
        self.rag_queries_total.fetch_add(1, Ordering::Relaxed);
        if confidence < LOW_CONFIDENCE_THRESHOLD {
            self.rag_low_confidence_total.fetch_add(1, Ordering::Relaxed);
        }
        self.status_total.add(status, 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            agent_execution_total: self.agent_execution_total.snapshot(),
            agent_execution_duration_ms_total: self.agent_execution_duration_ms_total.snapshot(),
            rag_queries_total: self.rag_queries_total.load(Ordering::Relaxed),
            rag_low_confidence_total: self.rag_low_confidence_total.load(Ordering::Relaxed),
            fallbacks_total: self.fallbacks_total.snapshot(),
            status_total: self.status_total.snapshot(),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub agent_execution_total: BTreeMap<String, u64>,
    pub agent_execution_duration_ms_total: BTreeMap<String, u64>,
    pub rag_queries_total: u64,
    pub rag_low_confidence_total: u64,
    pub fallbacks_total: BTreeMap<String, u64>,
    pub status_total: BTreeMap<String, u64>,
}
