//! Line-oriented operator command shell.
//!
//! Commands register under a name and receive the whitespace-separated
//! arguments that follow it. Results are reported with the status codes of
//! the OpenThread CLI the device firmware extends, so operator scripts see
//! the same `Done` / `Error 7: InvalidArgs` replies.
//!
//! # Example
//!
//! ```ignore
//! use knx_cfgmgr_common::shell::{CommandOutput, Shell, ShellCommand, ShellStatus};
//!
//! struct Ping;
//!
//! #[async_trait]
//! impl ShellCommand for Ping {
//!     fn name(&self) -> &str { "ping" }
//!     fn usage(&self) -> &str { "ping" }
//!     async fn run(&self, _args: &[&str], out: &mut CommandOutput) -> ShellStatus {
//!         out.line("pong");
//!         ShellStatus::Done
//!     }
//! }
//!
//! let mut shell = Shell::new();
//! shell.register(Arc::new(Ping));
//! let response = shell.execute("ping").await;
//! assert_eq!(response.to_string(), "pong\nDone");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::KnxMgrError;

/// Completion status of a shell command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellStatus {
    /// Command completed.
    Done,
    /// Malformed arguments or semantic rejection.
    InvalidArgs,
    /// Device state does not allow the command.
    InvalidState,
    /// No command registered under that name.
    InvalidCommand,
}

impl ShellStatus {
    /// Returns the OpenThread error code for this status.
    pub fn code(&self) -> u8 {
        match self {
            ShellStatus::Done => 0,
            ShellStatus::InvalidArgs => 7,
            ShellStatus::InvalidState => 13,
            ShellStatus::InvalidCommand => 35,
        }
    }

    /// Returns the status name as printed by the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShellStatus::Done => "Done",
            ShellStatus::InvalidArgs => "InvalidArgs",
            ShellStatus::InvalidState => "InvalidState",
            ShellStatus::InvalidCommand => "InvalidCommand",
        }
    }

    /// Returns true if the command completed.
    pub fn is_done(&self) -> bool {
        *self == ShellStatus::Done
    }
}

impl From<&KnxMgrError> for ShellStatus {
    fn from(err: &KnxMgrError) -> Self {
        match err {
            KnxMgrError::InvalidState { .. } => ShellStatus::InvalidState,
            _ => ShellStatus::InvalidArgs,
        }
    }
}

/// Lines printed by a command on the operator channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    lines: Vec<String>,
}

impl CommandOutput {
    /// Creates an empty output buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one line.
    pub fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Appends several lines.
    pub fn extend<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines.extend(lines.into_iter().map(Into::into));
    }

    /// Returns the printed lines.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// Reply to one executed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellResponse {
    /// Completion status.
    pub status: ShellStatus,
    /// Lines printed by the command.
    pub output: CommandOutput,
}

impl ShellResponse {
    /// Returns true if the command completed.
    pub fn is_done(&self) -> bool {
        self.status.is_done()
    }
}

impl fmt::Display for ShellResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.output.lines() {
            writeln!(f, "{}", line)?;
        }
        match self.status {
            ShellStatus::Done => write!(f, "Done"),
            status => write!(f, "Error {}: {}", status.code(), status.as_str()),
        }
    }
}

/// A command the shell can dispatch to.
#[async_trait]
pub trait ShellCommand: Send + Sync {
    /// Returns the command name (first token of the line).
    fn name(&self) -> &str;

    /// Returns a one-line usage string.
    fn usage(&self) -> &str;

    /// Runs the command with the tokens following its name.
    async fn run(&self, args: &[&str], out: &mut CommandOutput) -> ShellStatus;
}

/// Splits a command line into tokens.
pub fn tokenize(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

/// Registry of shell commands keyed by name.
#[derive(Default, Clone)]
pub struct Shell {
    commands: BTreeMap<String, Arc<dyn ShellCommand>>,
}

impl Shell {
    /// Creates a shell with no commands.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command, replacing any command with the same name.
    pub fn register(&mut self, command: Arc<dyn ShellCommand>) {
        self.commands.insert(command.name().to_string(), command);
    }

    /// Returns the registered command names, sorted.
    pub fn command_names(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    /// Returns the usage line of a registered command.
    pub fn usage(&self, name: &str) -> Option<&str> {
        self.commands.get(name).map(|c| c.usage())
    }

    /// Executes one command line.
    pub async fn execute(&self, line: &str) -> ShellResponse {
        let tokens = tokenize(line);
        let mut output = CommandOutput::new();

        let Some((name, args)) = tokens.split_first() else {
            return ShellResponse {
                status: ShellStatus::InvalidCommand,
                output,
            };
        };

        let status = match self.commands.get(*name) {
            Some(command) => {
                debug!(command = %name, args = args.len(), "Dispatching shell command");
                command.run(args, &mut output).await
            }
            None => ShellStatus::InvalidCommand,
        };

        ShellResponse { status, output }
    }
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shell")
            .field("commands", &self.command_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ShellCommand for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn usage(&self) -> &str {
            "echo <words>"
        }

        async fn run(&self, args: &[&str], out: &mut CommandOutput) -> ShellStatus {
            if args.is_empty() {
                return ShellStatus::InvalidArgs;
            }
            out.line(args.join(" "));
            ShellStatus::Done
        }
    }

    fn shell() -> Shell {
        let mut shell = Shell::new();
        shell.register(Arc::new(Echo));
        shell
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("  knx_got  add 1\t/p/o_1_1 20 ga 1 "),
            vec!["knx_got", "add", "1", "/p/o_1_1", "20", "ga", "1"]
        );
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ShellStatus::Done.code(), 0);
        assert_eq!(ShellStatus::InvalidArgs.code(), 7);
        assert_eq!(ShellStatus::InvalidState.code(), 13);
        assert_eq!(ShellStatus::InvalidCommand.code(), 35);
    }

    #[test]
    fn test_status_from_error() {
        let err = KnxMgrError::NotFound { id: 1 };
        assert_eq!(ShellStatus::from(&err), ShellStatus::InvalidArgs);

        let err = KnxMgrError::invalid_state("not loaded");
        assert_eq!(ShellStatus::from(&err), ShellStatus::InvalidState);
    }

    #[tokio::test]
    async fn test_execute_done() {
        let response = shell().execute("echo hello world").await;
        assert!(response.is_done());
        assert_eq!(response.to_string(), "hello world\nDone");
    }

    #[tokio::test]
    async fn test_execute_invalid_args() {
        let response = shell().execute("echo").await;
        assert_eq!(response.status, ShellStatus::InvalidArgs);
        assert_eq!(response.to_string(), "Error 7: InvalidArgs");
    }

    #[tokio::test]
    async fn test_execute_unknown_command() {
        let response = shell().execute("knx_unknown 1").await;
        assert_eq!(response.status, ShellStatus::InvalidCommand);

        let response = shell().execute("").await;
        assert_eq!(response.status, ShellStatus::InvalidCommand);
    }

    #[test]
    fn test_usage_lookup() {
        let shell = shell();
        assert_eq!(shell.command_names(), vec!["echo"]);
        assert_eq!(shell.usage("echo"), Some("echo <words>"));
        assert_eq!(shell.usage("missing"), None);
    }
}
