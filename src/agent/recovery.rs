//! Retry budget for the synthesize/execute loop.
//!
//! Every attempt is one synthesis call. The budget decides, from the failure
//! of the last attempt, whether another attempt is made and how its prompt
//! differs.

use super::contracts::AnswerError;
use crate::sandbox::FailureKind;
use crate::synthesis::{PriorFailure, SynthesisError};

#[derive(Debug, Clone)]
pub enum AttemptFailure {
    Synthesis(SynthesisError),
    Execution { source: String, kind: FailureKind, message: String },
}

impl AttemptFailure {
    pub fn answer_error(&self) -> AnswerError {
        match self {
            AttemptFailure::Synthesis(_) => AnswerError::SynthesisFailed,
            AttemptFailure::Execution { kind, .. } => (*kind).into(),
        }
    }

    pub fn kind_name(&self) -> String {
        match self {
            AttemptFailure::Synthesis(_) => "SynthesisError".to_string(),
            AttemptFailure::Execution { kind, .. } => kind.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryPlan {
    /// Re-synthesize with the failed program and its fault in the prompt.
    Revise(PriorFailure),
    /// Re-synthesize from the simplified prompt.
    Simplify,
}

#[derive(Debug, Clone)]
pub struct RetryBudget {
    retry_cap: usize,
    retries: usize,
    policy_retries: usize,
    resource_retries: usize,
    simplified: bool,
}

impl RetryBudget {
    pub fn new(retry_cap: usize) -> Self {
        Self {
            retry_cap,
            retries: 0,
            policy_retries: 0,
            resource_retries: 0,
            simplified: false,
        }
    }

    pub fn retries_used(&self) -> usize {
        self.retries
    }

    /// Whether the simplified prompt is in use for the remaining attempts.
    pub fn simplified(&self) -> bool {
        self.simplified
    }

    /// Plan the next attempt, or `None` when the failure is final.
    pub fn next(&mut self, failure: &AttemptFailure) -> Option<RetryPlan> {
        if self.retries >= self.retry_cap {
            return None;
        }
        let plan = match failure {
            AttemptFailure::Synthesis(_) => {
                if self.simplified {
                    return None;
                }
                self.simplified = true;
                RetryPlan::Simplify
            }
            AttemptFailure::Execution { source, kind, message } => {
                match kind {
                    FailureKind::PolicyViolation => {
                        if self.policy_retries >= 1 {
                            return None;
                        }
                        self.policy_retries += 1;
                    }
                    FailureKind::ResourceExceeded => {
                        if self.resource_retries >= 1 {
                            return None;
                        }
                        self.resource_retries += 1;
                    }
                    FailureKind::RuntimeFault => {}
                }
                RetryPlan::Revise(PriorFailure {
                    source: source.clone(),
                    kind: *kind,
                    message: message.clone(),
                })
            }
        };
        self.retries += 1;
        Some(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec(kind: FailureKind) -> AttemptFailure {
        AttemptFailure::Execution { source: "{}".into(), kind, message: "boom".into() }
    }

    #[test]
    fn test_runtime_faults_retry_until_cap() {
        let mut budget = RetryBudget::new(2);
        assert!(matches!(budget.next(&exec(FailureKind::RuntimeFault)), Some(RetryPlan::Revise(_))));
        assert!(matches!(budget.next(&exec(FailureKind::RuntimeFault)), Some(RetryPlan::Revise(_))));
        assert_eq!(budget.next(&exec(FailureKind::RuntimeFault)), None);
        assert_eq!(budget.retries_used(), 2);
    }

    #[test]
    fn test_policy_and_resource_retry_once_each() {
        let mut budget = RetryBudget::new(5);
        assert!(budget.next(&exec(FailureKind::PolicyViolation)).is_some());
        assert_eq!(budget.next(&exec(FailureKind::PolicyViolation)), None);

        let mut budget = RetryBudget::new(5);
        assert!(budget.next(&exec(FailureKind::ResourceExceeded)).is_some());
        assert_eq!(budget.next(&exec(FailureKind::ResourceExceeded)), None);
    }

    #[test]
    fn test_synthesis_error_falls_back_once() {
        let mut budget = RetryBudget::new(2);
        let failure = AttemptFailure::Synthesis(SynthesisError::MissingProgram);
        assert_eq!(budget.next(&failure), Some(RetryPlan::Simplify));
        assert!(budget.simplified());
        assert_eq!(budget.next(&failure), None);
        assert_eq!(failure.answer_error(), AnswerError::SynthesisFailed);
    }

    #[test]
    fn test_zero_cap_never_retries() {
        let mut budget = RetryBudget::new(0);
        assert_eq!(budget.next(&exec(FailureKind::RuntimeFault)), None);
    }
}
