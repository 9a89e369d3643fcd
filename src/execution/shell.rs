//! Shell execution layer - runs one script phase in a POSIX shell
//!
//! Every phase is a single interpreter invocation: the whole block of lines
//! is passed with `-c` behind a strict-failure preamble, so shell state
//! (assignments, `cd`, exports) carries from one line to the next and the
//! first failing command stops the phase. The child's stdin is closed, so a
//! command that reads stdin sees end of input.

use crate::execution::pump::{pump_duplex, LineSink, OutputMode, StreamKind};
use crate::execution::variables::{Environment, EnvironmentContext};
use console::Style;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Prepended to every script: stop on the first error, fail whole pipes
pub const STRICT_PREAMBLE: &str = "set -eo pipefail\n";

/// Errors from running a script
#[derive(Debug, Error)]
pub enum ShellError {
    /// Non-zero exit while `check` was requested
    #[error("script exited with code {exit_code}")]
    ProcessFailure {
        exit_code: i32,
        script: String,
        stdout: Option<String>,
        stderr: Option<String>,
    },

    #[error("no POSIX shell interpreter found (tried {0})")]
    InterpreterNotFound(String),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while running script: {0}")]
    Io(#[from] io::Error),

    #[error("script timed out after {0:?}")]
    Timeout(Duration),
}

impl ShellError {
    /// Exit code, when the process got far enough to produce one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ShellError::ProcessFailure { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

/// A resolved interpreter command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Interpreter {
    pub fn new(program: impl Into<PathBuf>, login: bool) -> Self {
        let args = if login { vec!["-l".to_string()] } else { Vec::new() };
        Self {
            program: program.into(),
            args,
        }
    }
}

/// Decides which interpreter runs scripts
///
/// Queried on every invocation so the executable can change without
/// touching the execution layer.
pub trait InterpreterStrategy: Send + Sync + fmt::Debug {
    /// `login` asks for a login shell (loads profile files, much slower)
    fn resolve(&self, login: bool) -> Result<Interpreter, ShellError>;
}

/// Looks `bash` up on PATH, then falls back to well-known locations
#[derive(Debug, Clone, Default)]
pub struct BashInterpreter;

impl BashInterpreter {
    #[cfg(windows)]
    const FALLBACK_PATHS: &'static [&'static str] = &[r"C:\Program Files\Git\bin\bash.exe"];

    #[cfg(not(windows))]
    const FALLBACK_PATHS: &'static [&'static str] = &["/bin/bash", "/usr/bin/bash", "/usr/local/bin/bash"];
}

impl InterpreterStrategy for BashInterpreter {
    fn resolve(&self, login: bool) -> Result<Interpreter, ShellError> {
        if let Ok(path) = which::which("bash") {
            return Ok(Interpreter::new(path, login));
        }

        Self::FALLBACK_PATHS
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
            .map(|p| Interpreter::new(p, login))
            .ok_or_else(|| {
                let mut tried = vec!["bash on PATH".to_string()];
                tried.extend(Self::FALLBACK_PATHS.iter().map(|p| p.to_string()));
                ShellError::InterpreterNotFound(tried.join(", "))
            })
    }
}

/// Always uses the given executable
#[derive(Debug, Clone)]
pub struct FixedInterpreter {
    program: PathBuf,
}

impl FixedInterpreter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl InterpreterStrategy for FixedInterpreter {
    fn resolve(&self, login: bool) -> Result<Interpreter, ShellError> {
        Ok(Interpreter::new(self.program.clone(), login))
    }
}

/// One script invocation
#[derive(Debug, Clone)]
pub struct ShellRequest {
    pub script: String,
    /// Complete child environment; `None` inherits the parent's
    pub env: Option<Environment>,
    pub cwd: Option<PathBuf>,
    pub mode: OutputMode,
    /// Turn a non-zero exit into [`ShellError::ProcessFailure`]
    pub check: bool,
    pub timeout: Option<Duration>,
}

impl ShellRequest {
    /// Capture mode, checked, inheriting environment and directory
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            env: None,
            cwd: None,
            mode: OutputMode::Capture,
            check: true,
            timeout: None,
        }
    }

    pub fn env(mut self, env: Environment) -> Self {
        self.env = Some(env);
        self
    }

    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Exit status and (in capture mode) output of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub exit_code: i32,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs scripts through the interpreter picked by its strategy
#[derive(Debug, Clone)]
pub struct ShellRunner {
    strategy: Arc<dyn InterpreterStrategy>,
    login_shell: bool,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(Arc::new(BashInterpreter))
    }
}

impl ShellRunner {
    pub fn new(strategy: Arc<dyn InterpreterStrategy>) -> Self {
        Self {
            strategy,
            login_shell: false,
        }
    }

    /// Bash runner honoring the context's login-shell flag
    pub fn from_context(context: &EnvironmentContext) -> Self {
        Self::default().with_login_shell(context.login_shell())
    }

    pub fn with_login_shell(mut self, login_shell: bool) -> Self {
        self.login_shell = login_shell;
        self
    }

    /// Script text as handed to the interpreter
    pub fn prepare_script(script: &str) -> String {
        format!("{}{}", STRICT_PREAMBLE, script.replace("\r\n", "\n"))
    }

    /// Run a script to completion
    pub async fn execute(&self, request: ShellRequest) -> Result<ShellOutput, ShellError> {
        let interpreter = self.strategy.resolve(self.login_shell)?;
        let script = Self::prepare_script(&request.script);

        let mut cmd = Command::new(&interpreter.program);
        cmd.args(&interpreter.args)
            .arg("-c")
            .arg(&script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own group, so a timeout reaches everything the script started.
        // Without a timeout the script stays in our group and sees Ctrl-C.
        #[cfg(unix)]
        if request.timeout.is_some() {
            cmd.process_group(0);
        }
        if let Some(env) = &request.env {
            cmd.env_clear().envs(env);
        }
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }

        debug!(
            "Spawning {} for a {}-byte script ({:?} mode)",
            interpreter.program.display(),
            script.len(),
            request.mode
        );

        let mut child = cmd.spawn().map_err(|source| ShellError::Spawn {
            program: interpreter.program.display().to_string(),
            source,
        })?;

        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let run = async {
            let output = pump_duplex(stdout, stderr, &request.mode).await?;
            let status = child.wait().await?;
            Ok::<_, ShellError>((status, output))
        };

        let (status, output) = match request.timeout {
            None => run.await?,
            Some(limit) => {
                let timed = tokio::time::timeout(limit, run).await;
                match timed {
                    Ok(result) => result?,
                    Err(_) => {
                        warn!("Script exceeded {:?}, killing its process group", limit);
                        terminate(&mut child).await;
                        return Err(ShellError::Timeout(limit));
                    }
                }
            }
        };

        let exit_code = exit_code(status);
        debug!("Interpreter exited with code {}", exit_code);

        if request.check && exit_code != 0 {
            return Err(ShellError::ProcessFailure {
                exit_code,
                script: request.script,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(ShellOutput {
            exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

fn missing_pipe(name: &str) -> ShellError {
    ShellError::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("child {} was not piped", name),
    ))
}

/// Kill the interpreter's whole process group, then reap the interpreter
#[cfg(unix)]
async fn terminate(child: &mut Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            if e != Errno::ESRCH {
                warn!(pid, error = ?e, "SIGKILL to process group failed");
            }
        }
    }
    let _ = child.kill().await;
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child) {
    let _ = child.kill().await;
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Writes streamed lines to the parent's stdout/stderr
///
/// Stdout lines are green and stderr lines red unless colors are off. Each
/// line goes out in a single locked write so concurrent jobs never
/// interleave partial lines.
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    color: bool,
    prefix: Option<String>,
}

impl ConsoleSink {
    pub fn new(color: bool) -> Self {
        Self {
            color,
            prefix: None,
        }
    }

    /// Prefix every line with `[label] `
    pub fn with_prefix(mut self, label: impl Into<String>) -> Self {
        self.prefix = Some(label.into());
        self
    }

    fn render(&self, stream: StreamKind, line: &str) -> String {
        let text = match &self.prefix {
            Some(label) => format!("[{}] {}", label, line),
            None => line.to_string(),
        };
        if !self.color {
            return text;
        }

        let style = match stream {
            StreamKind::Stdout => Style::new().green().bright(),
            StreamKind::Stderr => Style::new().red().bright(),
        };
        style.force_styling(true).apply_to(text).to_string()
    }
}

impl LineSink for ConsoleSink {
    fn write_line(&self, stream: StreamKind, line: &str) {
        let mut text = self.render(stream, line);
        text.push('\n');

        let _ = match stream {
            StreamKind::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(text.as_bytes()).and_then(|_| out.flush())
            }
            StreamKind::Stderr => {
                let mut err = io::stderr().lock();
                err.write_all(text.as_bytes()).and_then(|_| err.flush())
            }
        };
    }
}
