//! Claude Code headless backend.
//!
//! Runs the `claude` CLI in non-interactive mode (`-p`) with JSON output and
//! turns the response into a task outcome. The child process is killed if the
//! owning subagent is terminated mid-run.

use crate::error::{Error, Result};
use crate::subagent::{TaskBackend, TaskContext, TaskRequest};
use crate::zlog_debug;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// The result type from a Claude execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultType {
    Success { output: String },
    Error { message: String },
}

/// Response from a Claude headless execution.
#[derive(Debug, Clone)]
pub struct ClaudeResponse {
    pub session_id: Option<String>,
    pub result: ResultType,
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
    pub num_turns: Option<u32>,
}

impl ClaudeResponse {
    pub fn is_success(&self) -> bool {
        matches!(self.result, ResultType::Success { .. })
    }

    pub fn output(&self) -> Option<&str> {
        match &self.result {
            ResultType::Success { output } => Some(output),
            ResultType::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.result {
            ResultType::Success { .. } => None,
            ResultType::Error { message } => Some(message),
        }
    }

    fn from_failure(message: String) -> Self {
        Self {
            session_id: None,
            result: ResultType::Error { message },
            cost_usd: None,
            duration_ms: None,
            num_turns: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawClaudeResponse {
    subtype: Option<String>,
    result: Option<String>,
    session_id: Option<String>,
    total_cost_usd: Option<f64>,
    duration_ms: Option<u64>,
    num_turns: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

/// [`TaskBackend`] that shells out to Claude Code.
#[derive(Debug, Clone)]
pub struct ClaudeBackend {
    binary: PathBuf,
    /// Extra arguments from the configured command, e.g. `--dangerously-skip-permissions`.
    base_args: Vec<String>,
    cwd: PathBuf,
    timeout: Duration,
}

impl ClaudeBackend {
    /// Build a backend from a command line such as `claude --model opus`.
    ///
    /// The binary is resolved through `PATH`.
    pub fn from_command(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let binary = parts.next().unwrap_or("claude");
        let binary = which::which(binary).map_err(|_| Error::ClaudeBinaryNotFound)?;
        Ok(Self {
            binary,
            base_args: parts.map(String::from).collect(),
            cwd: PathBuf::from("."),
            timeout: Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Use a specific binary without `PATH` lookup.
    pub fn with_binary(binary: PathBuf) -> Self {
        Self {
            binary,
            base_args: Vec::new(),
            cwd: PathBuf::from("."),
            timeout: Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = cwd;
        self
    }

    /// Fallback timeout, used when a request carries none of its own.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Command-line arguments for one request.
    pub fn args_for(&self, request: &TaskRequest) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.extend([
            "-p".to_string(),
            request.prompt.clone(),
            "--output-format".to_string(),
            "json".to_string(),
            "--append-system-prompt".to_string(),
            request.system_prompt.clone(),
        ]);
        if !request.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(request.allowed_tools.join(","));
        }
        if let Some(model) = &request.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(turns) = request.max_turns {
            args.push("--max-turns".to_string());
            args.push(turns.to_string());
        }
        args
    }

    /// Run Claude for one request and parse its response.
    pub async fn execute(&self, request: &TaskRequest) -> Result<ClaudeResponse> {
        let timeout = request.timeout.unwrap_or(self.timeout);
        zlog_debug!(
            "Claude exec task={} role={} timeout={:?}",
            request.task_id,
            request.role,
            timeout
        );

        let output = tokio::time::timeout(
            timeout,
            Command::new(&self.binary)
                .args(self.args_for(request))
                .current_dir(&self.cwd)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| Error::Timeout(timeout))?
        .map_err(Error::Io)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if let Ok(response) = Self::parse_json_response(&stdout) {
            return Ok(response);
        }

        if !output.status.success() {
            let message = if stderr.trim().is_empty() {
                format!(
                    "Claude execution failed with exit code {}",
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.trim().to_string()
            };
            return Ok(ClaudeResponse::from_failure(message));
        }

        Ok(ClaudeResponse {
            session_id: None,
            result: ResultType::Success {
                output: stdout.trim().to_string(),
            },
            cost_usd: None,
            duration_ms: None,
            num_turns: None,
        })
    }

    pub fn parse_json_response(json_str: &str) -> Result<ClaudeResponse> {
        let raw: RawClaudeResponse = serde_json::from_str(json_str)?;

        let result = match raw.subtype.as_deref() {
            Some("success") => ResultType::Success {
                output: raw.result.unwrap_or_default(),
            },
            Some(subtype) if subtype.starts_with("error") => ResultType::Error {
                message: raw
                    .error
                    .or(raw.result)
                    .unwrap_or_else(|| subtype.to_string()),
            },
            _ => match (raw.error, raw.result) {
                (Some(error), _) => ResultType::Error { message: error },
                (None, Some(result)) => ResultType::Success { output: result },
                (None, None) => ResultType::Error {
                    message: "Unknown response format".to_string(),
                },
            },
        };

        Ok(ClaudeResponse {
            session_id: raw.session_id,
            result,
            cost_usd: raw.total_cost_usd,
            duration_ms: raw.duration_ms,
            num_turns: raw.num_turns,
        })
    }
}

#[async_trait]
impl TaskBackend for ClaudeBackend {
    async fn run(&self, request: TaskRequest, ctx: TaskContext) -> Result<String> {
        ctx.progress(0.05, Some("launching claude"));
        ctx.tool_call(
            "claude",
            serde_json::json!({
                "role": request.role,
                "tools": request.allowed_tools,
                "model": request.model,
            }),
        );

        let response = self.execute(&request).await?;

        ctx.tool_result(
            "claude",
            serde_json::json!({
                "success": response.is_success(),
                "session_id": response.session_id,
                "cost_usd": response.cost_usd,
                "num_turns": response.num_turns,
            }),
        );

        match response.result {
            ResultType::Success { output } => {
                ctx.progress(1.0, None);
                Ok(output)
            }
            ResultType::Error { message } => Err(Error::Backend(message)),
        }
    }

    fn name(&self) -> &str {
        "claude"
    }
}
