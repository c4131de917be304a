use crate::RuntimeError;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use tracing::debug;

/// Number of trailing stderr lines kept for failure classification.
pub const STDERR_TAIL_LINES: usize = 64;
/// Upper bound on the stderr bytes retained, whatever the line structure.
pub const STDERR_TAIL_BYTES: usize = 16 * 1024;

/// A fully specified child process: program, argv and the complete environment.
///
/// The environment is exact. Runners start the child with a cleared
/// environment and then apply `env`, so nothing leaks from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: i32,
    /// The last [`STDERR_TAIL_LINES`] lines the child wrote to stderr.
    pub stderr_tail: Vec<String>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// The only side-effecting seam of the launch path: run a process to completion.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<ProcessExit, RuntimeError>;
}

/// Spawns real processes.
///
/// stdin and stdout are inherited. stderr is forwarded to the caller's stderr
/// as soon as each chunk arrives, so prompts without a trailing newline show
/// up immediately, while the tail is retained for classification.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRunner;

impl ProcessRunner for OsRunner {
    fn run(&self, invocation: &Invocation) -> Result<ProcessExit, RuntimeError> {
        debug!(
            "spawning {} {}",
            invocation.program.display(),
            invocation.args.join(" ")
        );

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .env_clear()
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                program: invocation.program.display().to_string(),
                source,
            })?;

        let mut tail = StderrTail::default();
        if let Some(mut stderr) = child.stderr.take() {
            let mut out = std::io::stderr();
            let mut buf = [0u8; 8192];
            loop {
                let n = match stderr.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!("stopped reading child stderr: {e}");
                        break;
                    }
                };
                let _ = out.write_all(&buf[..n]);
                let _ = out.flush();
                tail.push(&buf[..n]);
            }
        }

        let status = child.wait()?;
        let code = exit_code(status);
        debug!("{} exited with code {code}", invocation.program.display());
        Ok(ProcessExit {
            code,
            stderr_tail: tail.into_lines(),
        })
    }
}

/// Rolling window over the last [`STDERR_TAIL_BYTES`] bytes of a stream.
#[derive(Debug, Default)]
struct StderrTail {
    bytes: VecDeque<u8>,
}

impl StderrTail {
    fn push(&mut self, chunk: &[u8]) {
        let chunk = &chunk[chunk.len().saturating_sub(STDERR_TAIL_BYTES)..];
        let overflow = (self.bytes.len() + chunk.len()).saturating_sub(STDERR_TAIL_BYTES);
        self.bytes.drain(..overflow);
        self.bytes.extend(chunk);
    }

    /// The retained bytes as at most [`STDERR_TAIL_LINES`] lines.
    fn into_lines(self) -> Vec<String> {
        let bytes: Vec<u8> = self.bytes.into();
        let text = String::from_utf8_lossy(&bytes);
        let text = text.strip_suffix('\n').unwrap_or(&text);
        if text.is_empty() {
            return Vec::new();
        }
        let lines: Vec<&str> = text.split('\n').collect();
        lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..]
            .iter()
            .map(|l| (*l).to_owned())
            .collect()
    }
}

/// Exit status as a shell would report it: the exit code, or 128 + signal.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
