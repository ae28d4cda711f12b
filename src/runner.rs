// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External command execution.
//!
//! Cache purging, maintenance mode, and submodule fetching are all done by
//! running external programs. Orchestration never spawns processes itself.
//! It hands an [`ExternalCommand`] to a [`CommandRunner`], which makes the
//! whole thing swappable in tests.

use std::{
    ffi::{OsStr, OsString},
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, instrument};

/// Description of an external command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
}

impl ExternalCommand {
    /// Construct new command for program.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a listing of arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run command from within a directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &OsStr {
        self.program.as_os_str()
    }

    pub fn arguments(&self) -> &[OsString] {
        self.args.as_slice()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }
}

impl Display for ExternalCommand {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.program.to_string_lossy().as_ref())?;
        for arg in &self.args {
            write!(fmt, " {}", arg.to_string_lossy())?;
        }

        Ok(())
    }
}

/// Exit status of an external command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    code: Option<i32>,
}

impl CommandStatus {
    /// Construct status from exit code.
    ///
    /// No exit code means the process was killed by a signal.
    pub fn new(code: Option<i32>) -> Self {
        Self { code }
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl Display for CommandStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self.code {
            Some(code) => write!(fmt, "exit status {code}"),
            None => fmt.write_str("terminated by signal"),
        }
    }
}

/// Run external commands.
pub trait CommandRunner {
    /// Run command to completion, and report its exit status.
    ///
    /// # Errors
    ///
    /// - Return [`RunnerError::Spawn`] if the command cannot be started.
    fn run(&self, command: &ExternalCommand) -> Result<CommandStatus>;
}

/// Run external commands as child processes of the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    #[instrument(skip(self, command), level = "debug")]
    fn run(&self, command: &ExternalCommand) -> Result<CommandStatus> {
        debug!("run {command}");
        let mut process = Command::new(command.program());
        process.args(command.arguments());
        if let Some(dir) = command.dir() {
            process.current_dir(dir);
        }

        let output = process.output().map_err(|source| RunnerError::Spawn {
            source,
            command: command.to_string(),
        })?;

        for stream in [output.stdout.as_slice(), output.stderr.as_slice()] {
            let text = String::from_utf8_lossy(stream);
            // INVARIANT: Chomp trailing newlines.
            let text = text.trim_end_matches(['\r', '\n']);
            if !text.is_empty() {
                debug!("{text}");
            }
        }

        Ok(CommandStatus::new(output.status.code()))
    }
}

/// Command runner error types.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Command cannot be started.
    #[error("failed to run {command:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = RunnerError> = std::result::Result<T, E>;
