//! Resource limits and their enforcement during a run.

use super::result::Fault;
use polars::prelude::DataFrame;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionLimits {
    pub time_limit: Duration,
    /// Ceiling on the estimated size of any intermediate frame.
    pub memory_limit_bytes: usize,
    pub max_steps: usize,
    pub max_result_rows: usize,
    pub max_result_cells: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_millis(crate::config::DEFAULT_EXEC_TIMEOUT_MS),
            memory_limit_bytes: crate::config::DEFAULT_EXEC_MEMORY_MB * 1024 * 1024,
            max_steps: crate::config::DEFAULT_EXEC_MAX_STEPS,
            max_result_rows: crate::config::DEFAULT_EXEC_MAX_ROWS,
            max_result_cells: crate::config::DEFAULT_EXEC_MAX_CELLS,
        }
    }
}

/// Per-run budget. The interpreter calls [`Budget::checkpoint`] between
/// steps and inside row loops; either the deadline or the token stops it.
pub struct Budget<'a> {
    limits: &'a ExecutionLimits,
    started: Instant,
    token: CancellationToken,
    steps: usize,
    peak_bytes: usize,
}

impl<'a> Budget<'a> {
    pub fn new(limits: &'a ExecutionLimits, token: CancellationToken) -> Self {
        Self {
            limits,
            started: Instant::now(),
            token,
            steps: 0,
            peak_bytes: 0,
        }
    }

    pub fn limits(&self) -> &ExecutionLimits {
        self.limits
    }

    pub fn checkpoint(&self) -> Result<(), Fault> {
        if self.token.is_cancelled() {
            return Err(Fault::resource("execution cancelled: time limit reached"));
        }
        let elapsed = self.started.elapsed();
        if elapsed > self.limits.time_limit {
            return Err(Fault::resource(format!(
                "Resource limit exceeded: elapsed ({:?}) > max ({:?})",
                elapsed, self.limits.time_limit
            )));
        }
        Ok(())
    }

    pub fn begin_step(&mut self) -> Result<(), Fault> {
        self.checkpoint()?;
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(Fault::resource(format!(
                "Resource limit exceeded: steps ({}) > max ({})",
                self.steps, self.limits.max_steps
            )));
        }
        Ok(())
    }

    /// Record the size of an intermediate frame.
    pub fn observe(&mut self, df: &DataFrame) -> Result<(), Fault> {
        let bytes = df.estimated_size();
        self.peak_bytes = self.peak_bytes.max(bytes);
        if bytes > self.limits.memory_limit_bytes {
            return Err(Fault::resource(format!(
                "Resource limit exceeded: intermediate frame ({} bytes) > max ({} bytes)",
                bytes, self.limits.memory_limit_bytes
            )));
        }
        Ok(())
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn peak_bytes(&self) -> usize {
        self.peak_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::result::FailureKind;
    use polars::prelude::*;

    #[test]
    fn test_step_limit() {
        let limits = ExecutionLimits { max_steps: 2, ..ExecutionLimits::default() };
        let mut budget = Budget::new(&limits, CancellationToken::new());
        assert!(budget.begin_step().is_ok());
        assert!(budget.begin_step().is_ok());
        let fault = budget.begin_step().unwrap_err();
        assert_eq!(fault.kind, FailureKind::ResourceExceeded);
    }

    #[test]
    fn test_cancelled_token_stops_run() {
        let limits = ExecutionLimits::default();
        let token = CancellationToken::new();
        let budget = Budget::new(&limits, token.clone());
        assert!(budget.checkpoint().is_ok());
        token.cancel();
        assert_eq!(budget.checkpoint().unwrap_err().kind, FailureKind::ResourceExceeded);
    }

    #[test]
    fn test_memory_ceiling() {
        let limits = ExecutionLimits { memory_limit_bytes: 8, ..ExecutionLimits::default() };
        let mut budget = Budget::new(&limits, CancellationToken::new());
        let df = df!["v" => [1.0f64, 2.0, 3.0, 4.0]].unwrap();
        assert!(budget.observe(&df).is_err());
        assert!(budget.peak_bytes() >= 32);
    }
}
