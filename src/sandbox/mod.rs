//! Sandboxed execution of generated analysis programs
//!
//! Programs are data, not code: a JSON list of steps over the named tables
//! of a snapshot. The policy gate checks every operation name against the
//! allow-list before anything runs; the interpreter then evaluates the steps
//! with polars under time, step, memory and result-size limits.

pub mod executor;
pub mod interpreter;
pub mod limits;
pub mod policy;
pub mod program;
pub mod result;
pub mod trend;

pub use executor::{ProgramExecutor, SandboxedExecutor};
pub use limits::ExecutionLimits;
pub use policy::AllowList;
pub use program::{GeneratedProgram, Operation, ProgramFormatError};
pub use result::{
    ExecutionLog, ExecutionResult, FailureKind, ResultColumn, ResultTable, ResultValue,
};
