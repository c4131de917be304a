use crate::runner::{Invocation, ProcessExit, ProcessRunner};
use crate::RuntimeError;
use std::collections::VecDeque;
use std::sync::Mutex;

enum Scripted {
    Exit(ProcessExit),
    SpawnFailure,
}

/// Records invocations and replays scripted exits instead of spawning.
///
/// With nothing scripted, every invocation exits with code 0.
#[derive(Default)]
pub struct MockRunner {
    invocations: Mutex<Vec<Invocation>>,
    script: Mutex<VecDeque<Scripted>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an exit for the next unscripted invocation.
    pub fn push_exit(&self, code: i32, stderr: &[&str]) {
        self.push(Scripted::Exit(ProcessExit {
            code,
            stderr_tail: stderr.iter().map(|s| (*s).to_owned()).collect(),
        }));
    }

    /// Queue a failure to start the process.
    pub fn push_spawn_failure(&self) {
        self.push(Scripted::SpawnFailure);
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .map(|inv| inv.clone())
            .unwrap_or_default()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().map(|inv| inv.len()).unwrap_or(0)
    }

    fn push(&self, entry: Scripted) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(entry);
        }
    }
}

impl ProcessRunner for MockRunner {
    fn run(&self, invocation: &Invocation) -> Result<ProcessExit, RuntimeError> {
        self.invocations
            .lock()
            .map_err(|e| RuntimeError::Io(std::io::Error::other(format!("mutex poisoned: {e}"))))?
            .push(invocation.clone());

        let next = self
            .script
            .lock()
            .map_err(|e| RuntimeError::Io(std::io::Error::other(format!("mutex poisoned: {e}"))))?
            .pop_front();

        match next {
            None => Ok(ProcessExit::default()),
            Some(Scripted::Exit(exit)) => Ok(exit),
            Some(Scripted::SpawnFailure) => Err(RuntimeError::Spawn {
                program: invocation.program.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock spawn failure"),
            }),
        }
    }
}
