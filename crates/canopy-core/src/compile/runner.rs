//! Blocking execution of external tools.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

/// How a tool's output streams are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCapture {
    /// Capture stdout and stderr.
    Captured,
    /// Inherit the parent's streams so output appears live.
    Streamed,
    /// Capture stdout (the tool's result) and stream stderr live.
    StdoutOnly,
}

/// A single tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(String, OsString)>,
    pub capture: OutputCapture,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            capture: OutputCapture::Captured,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, env: impl IntoIterator<Item = (String, OsString)>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn capture(mut self, capture: OutputCapture) -> Self {
        self.capture = capture;
        self
    }

    /// Program file name, for logs and messages.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Arguments as strings, lossily converted.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }
}

/// Result of a finished tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    /// Exit code, if the tool exited normally.
    pub code: Option<i32>,
    /// Captured stdout; empty when streamed.
    pub stdout: Vec<u8>,
    /// Captured stderr; empty when streamed.
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// Failed output with the given stderr.
    pub fn failed(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs tool invocations to completion.
pub trait ToolRunner {
    /// Run a tool and wait for it to exit.
    ///
    /// A tool exiting unsuccessfully is not an error; only failing to launch
    /// it is.
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;
}

/// Runs tools as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        tracing::debug!(
            "running {} {}",
            invocation.program.display(),
            invocation.args_lossy().join(" ")
        );

        let (stdout, stderr) = match invocation.capture {
            OutputCapture::Captured => (Stdio::piped(), Stdio::piped()),
            OutputCapture::Streamed => (Stdio::inherit(), Stdio::inherit()),
            OutputCapture::StdoutOnly => (Stdio::piped(), Stdio::inherit()),
        };

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);

        let output = command
            .output()
            .map_err(|e| Error::tool_spawn(&invocation.program, e))?;

        if !output.status.success() {
            tracing::debug!("{} exited with {}", invocation.program_name(), output.status);
        }

        Ok(ToolOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
