//! Hooks for watching an optimization run from the outside.

use std::sync::{Arc, Mutex};

use brainreg_core::transform::NUM_RIGID_PARAMETERS;

use crate::registration::OptimizationReport;

/// State of one accepted iteration, taken before the optimizer step.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    pub iteration: usize,
    /// Metric value (negative mutual information) at `parameters`.
    pub metric: f64,
    /// `[rx, ry, rz, tx, ty, tz]`
    pub parameters: [f64; NUM_RIGID_PARAMETERS],
    pub learning_rate: f64,
}

/// Receives every iteration of a [`crate::Registration`] run.
pub trait IterationObserver: Send + Sync {
    fn on_iteration(&self, record: &IterationRecord);

    fn on_finish(&self, _report: &OptimizationReport) {}
}

/// Keeps every iteration record in memory.
#[derive(Debug, Clone, Default)]
pub struct IterationLog {
    records: Arc<Mutex<Vec<IterationRecord>>>,
}

impl IterationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<IterationRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IterationObserver for IterationLog {
    fn on_iteration(&self, record: &IterationRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(iteration: usize, metric: f64) -> IterationRecord {
        IterationRecord {
            iteration,
            metric,
            parameters: [0.0, 0.0, 0.0, iteration as f64, 0.0, 0.0],
            learning_rate: 1.0,
        }
    }

    #[test]
    fn test_log_keeps_order() {
        let log = IterationLog::new();
        assert!(log.is_empty());

        let shared: Arc<dyn IterationObserver> = Arc::new(log.clone());
        shared.on_iteration(&record(0, -0.1));
        shared.on_iteration(&record(1, -0.2));

        let records = log.records();
        assert_eq!(log.len(), 2);
        assert_eq!(records[1].metric, -0.2);
        assert_eq!(records[1].parameters[3], 1.0);
    }
}
