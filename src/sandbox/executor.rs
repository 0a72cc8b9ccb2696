//! Sandboxed Executor
//!
//! Gate, then run on the blocking pool under a wall-clock limit. The run's
//! cancellation token is tripped on timeout and also when the calling future
//! is dropped (request deadline), so the interpreter stops at its next
//! checkpoint instead of outliving the request.

use super::limits::{Budget, ExecutionLimits};
use super::policy::AllowList;
use super::program::{GeneratedProgram, Program};
use super::result::{frame_to_value, ExecutionLog, ExecutionResult, Fault};
use super::interpreter;
use crate::dataset::DatasetSnapshot;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[async_trait]
pub trait ProgramExecutor: Send + Sync {
    /// Consumes the program. Never panics and never returns an error other
    /// than through [`ExecutionResult::Failure`].
    async fn execute(
        &self,
        program: GeneratedProgram,
        snapshot: &DatasetSnapshot,
        limits: &ExecutionLimits,
    ) -> ExecutionResult;

    fn allow_list(&self) -> &AllowList;
}

pub struct SandboxedExecutor {
    allow_list: AllowList,
}

impl SandboxedExecutor {
    pub fn new(allow_list: AllowList) -> Self {
        Self { allow_list }
    }
}

impl Default for SandboxedExecutor {
    fn default() -> Self {
        Self::new(AllowList::standard())
    }
}

#[async_trait]
impl ProgramExecutor for SandboxedExecutor {
    async fn execute(
        &self,
        program: GeneratedProgram,
        snapshot: &DatasetSnapshot,
        limits: &ExecutionLimits,
    ) -> ExecutionResult {
        let checked = match self.allow_list.check(&program, limits) {
            Ok(checked) => checked,
            Err(fault) => {
                warn!(kind = %fault.kind, "program rejected before execution: {}", fault.message);
                return fault.into();
            }
        };

        let token = CancellationToken::new();
        let _cancel_on_drop = token.clone().drop_guard();

        let worker_token = token.clone();
        let worker_snapshot = snapshot.clone();
        let worker_limits = limits.clone();
        let handle = tokio::task::spawn_blocking(move || {
            run_checked(&checked, &worker_snapshot, &worker_limits, worker_token)
        });

        match tokio::time::timeout(limits.time_limit, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                warn!("program worker failed: {}", join_error);
                Fault::runtime(format!("program aborted: {}", join_error)).into()
            }
            Err(_) => {
                token.cancel();
                Fault::resource(format!(
                    "Resource limit exceeded: execution time > max ({:?})",
                    limits.time_limit
                ))
                .into()
            }
        }
    }

    fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }
}

fn run_checked(
    program: &Program,
    snapshot: &DatasetSnapshot,
    limits: &ExecutionLimits,
    token: CancellationToken,
) -> ExecutionResult {
    let mut budget = Budget::new(limits, token);
    let mut log = ExecutionLog::default();

    let outcome = interpreter::run(program, snapshot, &mut budget, &mut log)
        .and_then(|df| frame_to_value(&df, limits));

    match outcome {
        Ok(value) => {
            debug!(
                steps = budget.steps(),
                peak_bytes = budget.peak_bytes(),
                shape = value.shape(),
                "program finished"
            );
            ExecutionResult::Success { value, log }
        }
        Err(fault) => fault.into(),
    }
}
