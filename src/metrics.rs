// SPDX-License-Identifier: MIT
//! Tagged metric emission.
//!
//! `Emitter` is the narrow seam every component uses for counters and gauges.
//! The default implementation writes structured `tracing` events that a
//! log-based metrics pipeline can scrape; a statsd/OTLP emitter can be
//! dropped in without touching call sites. `CaptureEmitter` records emissions
//! in memory and backs assertion-style tests across the crate.

use std::sync::Arc;
use std::sync::Mutex;

/// Metric sink. Implementations must be cheap to call on hot paths —
/// emission failures are never surfaced to callers.
pub trait Emitter: Send + Sync {
    /// Emit a distribution/counter sample.
    fn emit_dist(&self, name: &str, value: f64, tags: &[String]);

    /// Emit a gauge value.
    fn emit_gauge(&self, name: &str, value: f64, tags: &[String]);
}

/// Shared handle — cheaply clonable.
pub type SharedEmitter = Arc<dyn Emitter>;

/// Emitter that writes metrics as structured tracing events.
#[derive(Debug, Default, Clone)]
pub struct TracingEmitter;

impl Emitter for TracingEmitter {
    fn emit_dist(&self, name: &str, value: f64, tags: &[String]) {
        tracing::debug!(metric = name, value, tags = ?tags, kind = "dist", "metric");
    }

    fn emit_gauge(&self, name: &str, value: f64, tags: &[String]) {
        tracing::debug!(metric = name, value, tags = ?tags, kind = "gauge", "metric");
    }
}

/// Emitter that drops everything.
#[derive(Debug, Default, Clone)]
pub struct NoopEmitter;

impl Emitter for NoopEmitter {
    fn emit_dist(&self, _name: &str, _value: f64, _tags: &[String]) {}
    fn emit_gauge(&self, _name: &str, _value: f64, _tags: &[String]) {}
}

/// A single captured metric emission.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedMetric {
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
}

/// In-memory emitter for tests.
#[derive(Debug, Default)]
pub struct CaptureEmitter {
    events: Mutex<Vec<CapturedMetric>>,
}

impl CaptureEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All emissions so far, in order.
    pub fn emitted(&self) -> Vec<CapturedMetric> {
        self.events.lock().expect("capture emitter poisoned").clone()
    }

    /// Count of emissions with the given metric name.
    pub fn count(&self, name: &str) -> usize {
        self.emitted().iter().filter(|m| m.name == name).count()
    }
}

impl Emitter for CaptureEmitter {
    fn emit_dist(&self, name: &str, value: f64, tags: &[String]) {
        self.events
            .lock()
            .expect("capture emitter poisoned")
            .push(CapturedMetric {
                name: name.to_string(),
                value,
                tags: tags.to_vec(),
            });
    }

    fn emit_gauge(&self, name: &str, value: f64, tags: &[String]) {
        self.emit_dist(name, value, tags);
    }
}
