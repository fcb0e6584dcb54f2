//! Running the external build tool.
//!
//! The tool's stdout is piped through a formatter (`xcpretty` by default)
//! with `pipefail` semantics: a failure of either process fails the build.
//! Arguments go straight to the process as argv entries; no shell is involved.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::{debug, info, warn};

use crate::args::{BuildArg, display_args};
use crate::types::IpaError;

/// Default build tool.
pub const DEFAULT_TOOL: &str = "ipa";

/// Default output formatter.
pub const DEFAULT_FORMATTER: &str = "xcpretty";

/// A fully-resolved build tool command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to run.
    pub program: String,
    /// Arguments, one entry per argv slot.
    pub args: Vec<String>,
    display: String,
}

impl Invocation {
    /// `<program> build <args...> --verbose`
    pub fn ipa_build(program: impl Into<String>, build_args: &[BuildArg]) -> Self {
        let program = program.into();

        let mut args = vec!["build".to_string()];
        args.extend(build_args.iter().flat_map(BuildArg::to_argv));
        args.push("--verbose".to_string());

        let mut display = vec![program.clone(), "build".to_string()];
        if !build_args.is_empty() {
            display.push(display_args(build_args));
        }
        display.push("--verbose".to_string());

        Self {
            program,
            args,
            display: display.join(" "),
        }
    }

    /// Shell-like rendering for logs. Not meant to be executed.
    pub fn display(&self) -> &str {
        &self.display
    }
}

/// Executes a build. Implemented by [`ProcessRunner`]; tests substitute
/// their own to observe invocations.
pub trait BuildRunner {
    /// Runs the build to completion. Any non-zero exit is a
    /// [`IpaError::BuildFailure`].
    fn run(&self, invocation: &Invocation) -> Result<(), IpaError>;
}

/// Runs the build tool as a child process, optionally piped through a formatter.
///
/// # Example
///
/// ```no_run
/// use ipabuild_sdk::{BuildRunner, Invocation, ProcessRunner};
///
/// let runner = ProcessRunner::new().formatter(Some("xcpretty"));
/// runner.run(&Invocation::ipa_build("ipa", &[]))?;
/// # Ok::<(), ipabuild_sdk::IpaError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    formatter: Option<String>,
    current_dir: Option<PathBuf>,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            formatter: Some(DEFAULT_FORMATTER.to_string()),
            current_dir: None,
        }
    }
}

impl ProcessRunner {
    /// Creates a runner using the default formatter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the formatter command line (program and arguments, whitespace
    /// separated). `None` or a blank string streams output unformatted.
    pub fn formatter(mut self, formatter: Option<impl Into<String>>) -> Self {
        let formatter: Option<String> = formatter.map(Into::into);
        self.formatter = formatter.filter(|f| !f.trim().is_empty());
        self
    }

    /// Sets the working directory of the build tool.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    fn spawn_formatter(&self) -> Option<(String, Child)> {
        let formatter = self.formatter.as_deref()?;
        let mut parts = formatter.split_whitespace();
        let program = parts.next()?;
        match Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .spawn()
        {
            Ok(child) => Some((formatter.to_string(), child)),
            Err(err) => {
                warn!(formatter, error = %err, "formatter unavailable; streaming raw output");
                None
            }
        }
    }
}

impl BuildRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), IpaError> {
        info!(command = invocation.display(), "running build tool");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args).stdout(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| IpaError::BuildFailure {
            command: invocation.display().to_string(),
            status: format!(
                "could not be started ({}). Ensure `{}` is installed and on PATH",
                e, invocation.program
            ),
        })?;

        let mut tool_stdout = child.stdout.take().ok_or_else(|| {
            IpaError::Io(io::Error::other("build tool stdout was not captured"))
        })?;

        let formatter = self.spawn_formatter();
        let formatter = match formatter {
            Some((name, mut fmt_child)) => {
                if let Some(mut stdin) = fmt_child.stdin.take()
                    && let Err(err) = io::copy(&mut tool_stdout, &mut stdin)
                {
                    warn!(error = %err, "formatter stopped reading; discarding remaining output");
                }
                // Drain whatever the formatter did not consume so the tool can exit.
                io::copy(&mut tool_stdout, &mut io::sink())?;
                Some((name, fmt_child))
            }
            None => {
                let mut out = io::stdout().lock();
                io::copy(&mut tool_stdout, &mut out)?;
                out.flush()?;
                None
            }
        };

        let status = child.wait()?;
        debug!(status = %status, "build tool exited");
        let formatter = match formatter {
            Some((name, mut fmt_child)) => Some((name, fmt_child.wait()?)),
            None => None,
        };

        // The tool's own status takes precedence over the formatter's.
        if !status.success() {
            return Err(IpaError::BuildFailure {
                command: invocation.display().to_string(),
                status: describe(status),
            });
        }
        if let Some((name, fmt_status)) = formatter
            && !fmt_status.success()
        {
            return Err(IpaError::BuildFailure {
                command: format!("{} | {}", invocation.display(), name),
                status: describe(fmt_status),
            });
        }

        Ok(())
    }
}

fn describe(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exited with status {}", code),
        None => "was terminated by a signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_argv_and_display() {
        let args = vec![
            BuildArg::with_value("-s", "My App"),
            BuildArg::bare("--clean"),
        ];
        let invocation = Invocation::ipa_build("ipa", &args);

        assert_eq!(
            invocation.args,
            vec!["build", "-s", "My App", "--clean", "--verbose"]
        );
        assert_eq!(invocation.display(), r#"ipa build -s "My App" --clean --verbose"#);
    }

    #[test]
    fn test_invocation_without_args() {
        let invocation = Invocation::ipa_build("ipa", &[]);
        assert_eq!(invocation.args, vec!["build", "--verbose"]);
        assert_eq!(invocation.display(), "ipa build --verbose");
    }

    #[test]
    fn test_blank_formatter_disabled() {
        let runner = ProcessRunner::new().formatter(Some("  "));
        assert!(runner.formatter.is_none());
        let runner = ProcessRunner::new().formatter(None::<String>);
        assert!(runner.formatter.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_tool() {
        let runner = ProcessRunner::new().formatter(None::<String>);
        let invocation = Invocation {
            program: "true".into(),
            args: vec![],
            display: "true".into(),
        };
        runner.run(&invocation).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_tool_is_build_failure() {
        let runner = ProcessRunner::new().formatter(Some("cat"));
        let invocation = Invocation {
            program: "sh".into(),
            args: vec!["-c".into(), "echo building; exit 65".into()],
            display: "sh -c ...".into(),
        };
        let err = runner.run(&invocation).unwrap_err();
        match err {
            IpaError::BuildFailure { status, .. } => {
                assert_eq!(status, "exited with status 65");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_formatter_fails_pipeline() {
        let runner = ProcessRunner::new().formatter(Some("false"));
        let invocation = Invocation {
            program: "echo".into(),
            args: vec!["ok".into()],
            display: "echo ok".into(),
        };
        let err = runner.run(&invocation).unwrap_err();
        assert!(matches!(err, IpaError::BuildFailure { .. }));
    }

    #[test]
    fn test_missing_tool_is_build_failure() {
        let runner = ProcessRunner::new().formatter(None::<String>);
        let invocation = Invocation::ipa_build("ipabuild-definitely-missing-tool", &[]);
        let err = runner.run(&invocation).unwrap_err();
        assert!(err.to_string().contains("could not be started"));
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_formatter_streams_raw() {
        let runner = ProcessRunner::new().formatter(Some("ipabuild-missing-formatter"));
        let invocation = Invocation {
            program: "echo".into(),
            args: vec!["ok".into()],
            display: "echo ok".into(),
        };
        runner.run(&invocation).unwrap();
    }
}
