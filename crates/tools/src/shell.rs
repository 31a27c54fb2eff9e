//! Shell tool: execute system commands.
//!
//! Supports command allowlisting, a pinned working directory, a timeout and
//! output truncation. The child is killed if the call is cancelled or
//! times out.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use copycat_config::ShellConfig;
use copycat_core::error::ToolError;
use copycat_core::tool::{Tool, ToolContext, ToolOutput};
use tokio::process::Command;
use tracing::{debug, warn};

const NAME: &str = "executeCommand";

/// Operators that would let a command chain past the allowlist.
const SHELL_OPERATORS: &[&str] = &[";", "&", "|", "`", "$(", ">", "<", "\n"];

/// Arguments that turn an otherwise read-only allowlisted command into one
/// that writes, deletes or runs other programs. A trailing `*` matches any
/// argument with that prefix.
const WRITING_ARGS: &[(&str, &[&str])] = &[
    (
        "find",
        &["-delete", "-exec", "-execdir", "-ok", "-okdir", "-fprint*", "-fls"],
    ),
    ("tree", &["-o"]),
];

/// The argument as `sh` will see it once quotes and escapes are removed.
fn unquoted(arg: &str) -> String {
    arg.chars().filter(|c| !matches!(c, '"' | '\'' | '\\')).collect()
}

fn matches_pattern(arg: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => arg.starts_with(prefix),
        None => arg == pattern,
    }
}

/// Execute shell commands with safety constraints.
pub struct ShellTool {
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
    max_output_bytes: usize,
}

impl ShellTool {
    pub fn new(
        allowed_commands: Vec<String>,
        working_dir: PathBuf,
        timeout: Duration,
        max_output_bytes: usize,
    ) -> Self {
        Self {
            allowed_commands,
            working_dir,
            timeout,
            max_output_bytes,
        }
    }

    pub fn from_config(config: &ShellConfig, working_dir: PathBuf) -> Self {
        Self::new(
            config.allowed_commands.clone(),
            working_dir,
            Duration::from_secs(config.timeout_secs),
            config.max_output_bytes,
        )
    }

    fn check_allowed(&self, command: &str) -> Result<(), ToolError> {
        if self.allowed_commands.is_empty() {
            return Ok(()); // No allowlist = all commands allowed
        }

        let denied = |reason: String| ToolError::PermissionDenied {
            tool_name: NAME.into(),
            reason,
        };

        if let Some(op) = SHELL_OPERATORS.iter().find(|op| command.contains(**op)) {
            return Err(denied(format!("shell operator '{}' is not allowed", op.escape_default())));
        }

        // Extract the base command (first word)
        let mut words = command.split_whitespace();
        let base_cmd = words.next().unwrap_or("").trim();
        if !self.allowed_commands.iter().any(|a| a == base_cmd) {
            return Err(denied(format!("Command '{base_cmd}' not in allowlist")));
        }

        if let Some((_, patterns)) = WRITING_ARGS.iter().find(|(cmd, _)| *cmd == base_cmd) {
            for arg in words.map(unquoted) {
                if patterns.iter().any(|p| matches_pattern(&arg, p)) {
                    return Err(denied(format!(
                        "argument '{arg}' is not allowed for '{base_cmd}'"
                    )));
                }
            }
        }

        Ok(())
    }

    fn truncate(&self, mut text: String) -> String {
        if text.len() <= self.max_output_bytes {
            return text;
        }
        let mut cut = self.max_output_bytes;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("\n[output truncated]");
        text
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Executes a Linux/Unix command and returns the output."
    }

    fn input_description(&self) -> &str {
        "command: string"
    }

    async fn invoke(&self, input: &str, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let command = input.trim();
        if command.is_empty() {
            return Err(ToolError::InvalidInput("a command is required".into()));
        }

        self.check_allowed(command)?;

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: NAME.into(),
            reason,
        };

        tokio::fs::create_dir_all(&self.working_dir)
            .await
            .map_err(|e| failed(format!("cannot prepare working directory: {e}")))?;

        debug!(command = %command, cwd = %self.working_dir.display(), "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(&self.working_dir).kill_on_drop(true);

        let output = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                return Err(ToolError::Cancelled(NAME.into()));
            }
            result = tokio::time::timeout(self.timeout, cmd.output()) => match result {
                Err(_) => {
                    warn!(command = %command, "Command timed out");
                    return Err(ToolError::Timeout {
                        tool_name: NAME.into(),
                        timeout_secs: self.timeout.as_secs(),
                    });
                }
                Ok(Err(e)) => return Err(failed(e.to_string())),
                Ok(Ok(output)) => output,
            },
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let result_text = if output.status.success() {
            if stderr.is_empty() {
                stdout
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            }
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            format!("[exit code: {code}]\n{stdout}\n{stderr}")
        };

        Ok(ToolOutput::text(self.truncate(result_text.trim().to_string())))
    }
}
