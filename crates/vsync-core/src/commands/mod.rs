//! Ordered command pipeline run when a version change is required
//!
//! Steps are configured under `sync.commands` and executed as subprocesses
//! in declared order. Each step's command, arguments and environment are
//! templates rendered against a [`CommandContext`].

mod executor;
mod template;

pub use executor::{PipelineReport, StepOutcome, StepStatus, SyncCommand, run_pipeline};
pub use template::{CommandContext, Template, TemplateField};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Configuration for a single pipeline step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Step name used in logs and errors
    #[serde(default)]
    pub name: String,
    /// Program to execute
    #[serde(default)]
    pub cmd: String,
    /// Arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the program
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub disabled: bool,
    /// Continue with the next step when this one fails
    #[serde(default)]
    pub allow_failure: bool,
    /// Abort the pipeline when this one fails, regardless of `allow_failure`
    #[serde(default)]
    pub must_succeed: bool,
    /// Forward stdout/stderr to the log line by line
    #[serde(default)]
    pub stream_output: bool,
    /// Render and log the step without launching it
    #[serde(default)]
    pub dry_run: bool,
}
