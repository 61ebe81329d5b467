//! External command execution.
//!
//! Every OS interaction in tunnelgate is a blocking child process. The
//! [`CommandRunner`] trait hides `std::process::Command` so the parsers and the
//! orchestrator can be driven by scripted output in tests.

use std::process::Command;

use log::debug;

use crate::error::{Error, Result};

/// Exit status and captured output of a finished command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stdout.
    #[must_use]
    pub fn failed(code: i32, stdout: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Stderr if present, otherwise stdout. Used for error messages.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        text.trim().to_string()
    }

    /// Turn a non-zero exit into [`Error::ExternalTool`].
    pub fn into_result(self, program: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::ExternalTool {
                program: program.to_string(),
                code: self.code,
                output: self.diagnostic(),
            })
        }
    }
}

/// Runs external programs.
pub trait CommandRunner {
    /// Run `program` with `args` to completion and capture its output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the program could not be started. A
    /// non-zero exit is *not* an error here; callers inspect the output.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        (**self).run(program, args)
    }
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| Error::Spawn {
                program: program.to_string(),
                source,
            })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        debug!(
            "EXEC: {program} {} -> {:?}",
            args.join(" "),
            result.code
        );
        Ok(result)
    }
}

/// Render a command line for logs and `check-config`.
#[must_use]
pub fn display_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}


#[cfg(test)]
mod tests {
    use super::scripted::ScriptedRunner;
    use super::*;

    #[test]
    fn test_output_success() {
        assert!(CommandOutput::ok("").success());
        assert!(!CommandOutput::failed(3, "").success());
        assert!(!CommandOutput::default().success());
    }

    #[test]
    fn test_diagnostic_prefers_stderr() {
        let out = CommandOutput {
            code: Some(1),
            stdout: "stdout text".into(),
            stderr: "  boom \n".into(),
        };
        assert_eq!(out.diagnostic(), "boom");
        assert_eq!(CommandOutput::failed(1, "only stdout").diagnostic(), "only stdout");
    }

    #[test]
    fn test_into_result() {
        assert!(CommandOutput::ok("x").into_result("tool").is_ok());
        match CommandOutput::failed(2, "bad").into_result("tool") {
            Err(Error::ExternalTool { program, code, output }) => {
                assert_eq!(program, "tool");
                assert_eq!(code, Some(2));
                assert_eq!(output, "bad");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_display_command() {
        assert_eq!(display_command("route", &["-n"]), "route -n");
        assert_eq!(display_command("true", &[]), "true");
    }

    #[test]
    fn test_system_runner_missing_program() {
        let result = SystemRunner.run("/nonexistent/tunnelgate-test-binary", &[]);
        assert!(matches!(result, Err(Error::Spawn { .. })));
    }

    #[test]
    fn test_scripted_runner_sticky_last() {
        let runner = ScriptedRunner::new();
        runner.script(
            "svc status",
            vec![CommandOutput::failed(3, "stopped"), CommandOutput::ok("started")],
        );
        assert_eq!(runner.run("svc", &["status"]).unwrap().stdout, "stopped");
        assert_eq!(runner.run("svc", &["status"]).unwrap().stdout, "started");
        assert_eq!(runner.run("svc", &["status"]).unwrap().stdout, "started");
        assert_eq!(runner.count("svc status"), 3);
        assert!(!runner.run("other", &[]).unwrap().success());
    }
}
