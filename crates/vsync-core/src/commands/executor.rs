use std::collections::BTreeMap;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};

use super::CommandConfig;
use super::template::{CommandContext, Template};
use crate::error::{Error, Result};

/// A pipeline step with its templates parsed
#[derive(Debug, Clone)]
pub struct SyncCommand {
    pub name: String,
    pub cmd: Template,
    pub args: Vec<Template>,
    pub environment: BTreeMap<String, Template>,
    pub disabled: bool,
    pub allow_failure: bool,
    pub must_succeed: bool,
    pub stream_output: bool,
    pub dry_run: bool,
}

impl SyncCommand {
    /// Parse the step at `index` of `sync.commands`
    pub fn parse(index: usize, config: &CommandConfig) -> Result<Self> {
        let name = config.name.trim();
        if name.is_empty() {
            return Err(Error::config(
                format!("sync.commands[{index}].name"),
                "is required",
            ));
        }
        if config.cmd.trim().is_empty() {
            return Err(Error::config(
                format!("sync.commands[{index}].cmd"),
                "is required",
            ));
        }

        let template = |field: String, source: &str| {
            Template::parse(source).map_err(|reason| Error::InvalidTemplate {
                command: name.to_string(),
                field,
                reason,
            })
        };

        let cmd = template("cmd".to_string(), &config.cmd)?;
        let args = config
            .args
            .iter()
            .enumerate()
            .map(|(i, arg)| template(format!("args[{i}]"), arg))
            .collect::<Result<Vec<_>>>()?;
        let environment = config
            .environment
            .iter()
            .map(|(key, value)| -> Result<(String, Template)> {
                Ok((key.trim().to_string(), template(format!("env[{key}]"), value)?))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Self {
            name: name.to_string(),
            cmd,
            args,
            environment,
            disabled: config.disabled,
            allow_failure: config.allow_failure,
            must_succeed: config.must_succeed,
            stream_output: config.stream_output,
            dry_run: config.dry_run,
        })
    }

    /// Rendered program, arguments and environment for `context`.
    ///
    /// Arguments that render blank are dropped.
    pub fn render(&self, context: &CommandContext) -> (String, Vec<String>, Vec<(String, String)>) {
        let program = self.cmd.render(context).trim().to_string();
        let args = self
            .args
            .iter()
            .map(|a| a.render(context))
            .filter(|a| !a.trim().is_empty())
            .collect();
        let env = self
            .environment
            .iter()
            .map(|(k, v)| (k.clone(), v.render(context).trim().to_string()))
            .collect();
        (program, args, env)
    }
}

/// What happened to one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    /// Disabled in configuration
    Skipped,
    DryRun,
    /// Failed, and `allow_failure` let the pipeline continue
    FailedAllowed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub name: String,
    pub status: StepStatus,
}

/// Ordered outcomes of a pipeline that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub steps: Vec<StepOutcome>,
}

impl PipelineReport {
    /// Names of steps with the given status, in execution order
    pub fn names_with(&self, status: StepStatus) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.status == status)
            .map(|s| s.name.as_str())
            .collect()
    }
}

struct StepRun {
    success: bool,
    exit_code: Option<i32>,
    stderr: String,
}

/// Run `commands` in order.
///
/// A failing step aborts the pipeline unless it sets `allow_failure` without
/// `must_succeed`. The first unrecoverable failure is returned as the error.
pub async fn run_pipeline(commands: &[SyncCommand], base: &CommandContext) -> Result<PipelineReport> {
    let count = commands.len();
    let mut report = PipelineReport::default();

    for (index, command) in commands.iter().enumerate() {
        let outcome = |status| StepOutcome {
            index,
            name: command.name.clone(),
            status,
        };

        if command.disabled {
            tracing::info!(step = %command.name, index, "Skipping disabled command");
            report.steps.push(outcome(StepStatus::Skipped));
            continue;
        }

        let context = base.for_step(index, count);
        let (program, args, env) = command.render(&context);

        if command.dry_run {
            tracing::info!(step = %command.name, index, cmd = %program, ?args, "Dry run - command not executed");
            report.steps.push(outcome(StepStatus::DryRun));
            continue;
        }

        tracing::info!(step = %command.name, index, count, cmd = %program, ?args, "Running command");
        let failure = match execute_command(command, &program, &args, &env).await {
            Ok(run) if run.success => None,
            Ok(run) => {
                let stderr = run.stderr.trim();
                let detail = if stderr.is_empty() {
                    String::new()
                } else {
                    format!(": {stderr}")
                };
                Some(Error::CommandFailed {
                    name: command.name.clone(),
                    exit_code: run.exit_code,
                    detail,
                })
            }
            Err(e) => Some(e),
        };

        match failure {
            None => {
                tracing::info!(step = %command.name, index, "Command succeeded");
                report.steps.push(outcome(StepStatus::Succeeded));
            }
            Some(error) if command.must_succeed => {
                tracing::error!(step = %command.name, index, error = %error, "Required command failed - aborting");
                return Err(error);
            }
            Some(error) if command.allow_failure => {
                tracing::warn!(step = %command.name, index, error = %error, "Command failed - continuing");
                report.steps.push(outcome(StepStatus::FailedAllowed));
            }
            Some(error) => {
                tracing::error!(step = %command.name, index, error = %error, "Command failed - aborting");
                return Err(error);
            }
        }
    }

    Ok(report)
}

/// How long output readers may keep going once the step has exited.
///
/// Background processes started by a step inherit its pipes and can hold
/// them open indefinitely.
const OUTPUT_GRACE: Duration = Duration::from_millis(500);

/// Bytes of stderr kept for the failure detail
const STDERR_TAIL_BYTES: usize = 8 * 1024;

/// Launch one rendered step and wait for it
async fn execute_command(
    command: &SyncCommand,
    program: &str,
    args: &[String],
    env: &[(String, String)],
) -> Result<StepRun> {
    let launch_failed = |reason: String| Error::CommandLaunch {
        name: command.name.clone(),
        reason,
    };
    if program.is_empty() {
        return Err(launch_failed("command rendered empty".to_string()));
    }

    let stdout = if command.stream_output {
        Stdio::piped()
    } else {
        Stdio::null()
    };
    let mut child = Command::new(program)
        .args(args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| launch_failed(e.to_string()))?;

    let step = command.name.as_str();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut tail = Vec::new();

    let status = if command.stream_output {
        let drain = async {
            tokio::join!(
                forward_lines(stdout, "stdout", step, |line| {
                    tracing::info!(step, stream = "stdout", "{line}");
                }),
                forward_lines(stderr, "stderr", step, |line| {
                    tracing::info!(step, stream = "stderr", "{line}");
                    keep_tail(&mut tail, line.as_bytes());
                    keep_tail(&mut tail, b"\n");
                }),
            );
        };
        wait_draining(&mut child, drain, step).await
    } else {
        wait_draining(&mut child, capture_tail(stderr, &mut tail, step), step).await
    }
    .map_err(|e| launch_failed(e.to_string()))?;

    Ok(StepRun {
        success: status.success(),
        exit_code: status.code(),
        stderr: String::from_utf8_lossy(&tail).into_owned(),
    })
}

/// Wait for `child` while `drain` consumes its output, then give the
/// readers [`OUTPUT_GRACE`] to reach end of stream.
async fn wait_draining<F>(child: &mut Child, drain: F, step: &str) -> std::io::Result<ExitStatus>
where
    F: Future<Output = ()>,
{
    tokio::pin!(drain);
    let mut drained = false;
    let status = loop {
        tokio::select! {
            status = child.wait() => break status?,
            () = &mut drain, if !drained => drained = true,
        }
    };

    if !drained && tokio::time::timeout(OUTPUT_GRACE, drain).await.is_err() {
        tracing::debug!(step, "Command output still open after exit - no longer reading");
    }
    Ok(status)
}

/// Hand each line of `reader` to `on_line` until it closes.
///
/// Lines are split on `\n` and decoded lossily, so arbitrary bytes never
/// stop the reader.
async fn forward_lines<R, F>(reader: Option<R>, stream: &'static str, step: &str, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let Some(reader) = reader else {
        return;
    };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                on_line(line.trim_end_matches(['\n', '\r']));
            }
            Err(e) => {
                tracing::warn!(step, stream, error = %e, "Stopped reading command output");
                break;
            }
        }
    }
}

/// Read `reader` to the end, keeping only its last bytes in `tail`
async fn capture_tail<R>(reader: Option<R>, tail: &mut Vec<u8>, step: &str)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => keep_tail(tail, &chunk[..n]),
            Err(e) => {
                tracing::warn!(step, stream = "stderr", error = %e, "Stopped reading command output");
                break;
            }
        }
    }
}

fn keep_tail(tail: &mut Vec<u8>, bytes: &[u8]) {
    tail.extend_from_slice(bytes);
    if tail.len() > STDERR_TAIL_BYTES {
        let excess = tail.len() - STDERR_TAIL_BYTES;
        tail.drain(..excess);
    }
}
