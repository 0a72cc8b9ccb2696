//! Allow-list gate
//!
//! A program passes only if every declared operation is on the allow-list
//! and every step uses a declared operation. The check runs on the raw JSON
//! before typed decoding, so an unknown `op` is reported as a policy
//! violation and never as a decoding error.

use super::limits::ExecutionLimits;
use super::program::{GeneratedProgram, Operation, Program};
use super::result::Fault;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    operations: BTreeSet<Operation>,
}

impl AllowList {
    pub fn new(operations: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            operations: operations.into_iter().collect(),
        }
    }

    /// Every operation the interpreter implements.
    pub fn standard() -> Self {
        Self::new(Operation::ALL)
    }

    pub fn contains(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        Operation::from_name(name).map_or(false, |op| self.contains(op))
    }

    pub fn iter(&self) -> impl Iterator<Item = Operation> + '_ {
        self.operations.iter().copied()
    }

    /// Validate a program and decode it. Nothing is executed here.
    pub fn check(&self, program: &GeneratedProgram, limits: &ExecutionLimits) -> Result<Program, Fault> {
        let outside: Vec<&str> = program
            .declared_operations
            .iter()
            .filter(|name| !self.contains_name(name))
            .map(String::as_str)
            .collect();
        if !outside.is_empty() {
            return Err(Fault::policy(format!(
                "declared operations not permitted: {}",
                outside.join(", ")
            )));
        }

        let raw: serde_json::Value = serde_json::from_str(&program.source)
            .map_err(|e| Fault::runtime(format!("program is not valid JSON: {}", e)))?;
        let steps = raw
            .get("steps")
            .and_then(|s| s.as_array())
            .ok_or_else(|| Fault::runtime("program has no \"steps\" list"))?;

        if steps.len() > limits.max_steps {
            return Err(Fault::resource(format!(
                "Resource limit exceeded: steps ({}) > max ({})",
                steps.len(),
                limits.max_steps
            )));
        }

        // The header must also match the body: `uses` in the raw document.
        let header: BTreeSet<&str> = raw
            .get("uses")
            .and_then(|u| u.as_array())
            .map(|u| u.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        let declared: BTreeSet<&str> = program.declared_operations.iter().map(String::as_str).collect();
        if header != declared {
            return Err(Fault::policy(
                "declared operations do not match the program header",
            ));
        }

        for (idx, step) in steps.iter().enumerate() {
            let name = step
                .get("op")
                .and_then(|op| op.as_str())
                .ok_or_else(|| Fault::runtime(format!("step {} has no \"op\" name", idx + 1)))?;
            if Operation::from_name(name).is_none() {
                return Err(Fault::policy(format!(
                    "step {} uses unknown operation '{}'",
                    idx + 1,
                    name
                )));
            }
            if !declared.contains(name) {
                return Err(Fault::policy(format!(
                    "step {} uses operation '{}' which the program did not declare",
                    idx + 1,
                    name
                )));
            }
        }

        serde_json::from_value::<Program>(raw)
            .map_err(|e| Fault::runtime(format!("malformed program: {}", e)))
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::standard()
    }
}
