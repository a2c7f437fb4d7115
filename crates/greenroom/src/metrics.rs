//! Metric points and the batching reporter.
//!
//! Handlers and timers call [`MetricsReporter::add_metric`]; points pile up
//! in memory until the flush timer hands the batch to a [`MetricsSink`].
//! The sink owns the transport to whatever time-series backend is in use.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::MetricsConfig;

/// Errors reported by a [`MetricsSink`].
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics sink rejected {count} points: {reason}")]
    Rejected { count: usize, reason: String },
}

/// A field value of a point.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<usize> for FieldValue {
    fn from(value: usize) -> Self {
        FieldValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// One named, tagged, timestamped measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: DateTime<Utc>,
}

/// Destination of flushed batches.
pub trait MetricsSink: Send + Sync + 'static {
    /// Writes a batch.
    ///
    /// # Errors
    /// Whatever the backend reports. The reporter logs the error and drops
    /// the batch.
    fn write(&self, points: &[MetricPoint]) -> Result<(), MetricsError>;
}

/// Sink that emits each point as a `debug` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn write(&self, points: &[MetricPoint]) -> Result<(), MetricsError> {
        for point in points {
            tracing::debug!(
                metric = %point.name,
                tags = ?point.tags,
                fields = ?point.fields,
                at = %point.timestamp,
                "metric point"
            );
        }
        Ok(())
    }
}

/// Collects points and flushes them in batches.
pub struct MetricsReporter {
    app: String,
    version: String,
    hostname: Option<String>,
    batch: Mutex<Vec<MetricPoint>>,
    sink: Box<dyn MetricsSink>,
}

impl MetricsReporter {
    pub fn new(config: &MetricsConfig, sink: impl MetricsSink) -> Self {
        Self::with_boxed_sink(config, Box::new(sink))
    }

    pub(crate) fn with_boxed_sink(config: &MetricsConfig, sink: Box<dyn MetricsSink>) -> Self {
        Self {
            app: config.app.clone(),
            version: config.version.clone(),
            hostname: std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()),
            batch: Mutex::new(Vec::new()),
            sink,
        }
    }

    /// Queues a point stamped with the current time. The `app`, `version`
    /// and `hostname` tags are added here.
    pub fn add_metric(
        &self,
        name: impl Into<String>,
        mut tags: BTreeMap<String, String>,
        fields: BTreeMap<String, FieldValue>,
    ) {
        if let Some(hostname) = &self.hostname {
            tags.insert("hostname".to_string(), hostname.clone());
        }
        tags.insert("app".to_string(), self.app.clone());
        tags.insert("version".to_string(), self.version.clone());

        let point = MetricPoint {
            name: name.into(),
            tags,
            fields,
            timestamp: Utc::now(),
        };
        self.lock_batch().push(point);
    }

    /// Number of points waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.lock_batch().len()
    }

    /// Hands the current batch to the sink. Returns how many points were
    /// written; a rejected batch is dropped.
    pub fn flush(&self) -> usize {
        let points = std::mem::take(&mut *self.lock_batch());
        if points.is_empty() {
            return 0;
        }
        match self.sink.write(&points) {
            Ok(()) => {
                tracing::trace!(count = points.len(), "metrics flushed");
                points.len()
            }
            Err(e) => {
                tracing::warn!(count = points.len(), error = %e, "metrics flush failed, batch dropped");
                0
            }
        }
    }

    fn lock_batch(&self) -> std::sync::MutexGuard<'_, Vec<MetricPoint>> {
        self.batch.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for MetricsReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsReporter")
            .field("app", &self.app)
            .field("version", &self.version)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}
