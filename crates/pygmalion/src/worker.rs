//! Semantic-index worker subprocess management.
//!
//! The daemon spawns one `pygclangindex` subprocess per indexing thread and
//! speaks the binary protocol of [`crate::wire`] over its standard streams.
//! The exchange is strictly turn-based: one `Analyze`, then responses until
//! `EndOfDefs`. Parallelism comes from running several workers, never from
//! pipelining a single one.

use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::CommandInfo;
use crate::wire::{WorkerRequest, WorkerResponse};

/// A live worker subprocess with exclusive ownership of its stdio pair.
pub struct Worker {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    exe: PathBuf,
}

impl Worker {
    /// Spawn a worker from the given executable.
    pub fn spawn(exe: &Path) -> Result<Self> {
        debug!(exe = %exe.display(), "spawning semantic-index worker");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Internal("worker stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("worker stdout not captured".to_string()))?;

        Ok(Self {
            child,
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
            exe: exe.to_path_buf(),
        })
    }

    /// Start one analysis turn and stream the worker's facts.
    ///
    /// The returned iterator yields fact responses and stops at `EndOfDefs`.
    /// Any decode failure or early stream close surfaces as one `Err` item;
    /// the caller must then discard this worker (the stream position is
    /// unknown, which is the protocol-desynchronization case).
    pub fn analyze(&mut self, ci: &CommandInfo) -> Result<Facts<'_>> {
        WorkerRequest::Analyze(ci.clone()).write_to(&mut self.stdin)?;
        self.stdin.flush()?;
        Ok(Facts {
            stdout: &mut self.stdout,
            done: false,
        })
    }

    /// Ask the worker to exit and reap it.
    pub fn shutdown(mut self) {
        let send = WorkerRequest::Shutdown
            .write_to(&mut self.stdin)
            .and_then(|()| self.stdin.flush().map_err(Into::into));
        if let Err(e) = send {
            warn!(exe = %self.exe.display(), error = %e, "worker shutdown send failed");
        }
        // Closing stdin is the EOF fallback for a worker that missed the
        // message; then reap.
        drop(self.stdin);
        if let Err(e) = self.child.wait() {
            warn!(exe = %self.exe.display(), error = %e, "worker wait failed");
        }
    }

    /// Kill a desynchronized worker without ceremony.
    pub fn discard(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Streaming iterator over one analysis turn's responses.
///
/// Backed by the length-prefixed reader on the worker's standard output;
/// yields until `EndOfDefs`, which it consumes silently.
pub struct Facts<'a> {
    stdout: &'a mut BufReader<ChildStdout>,
    done: bool,
}

impl Iterator for Facts<'_> {
    type Item = Result<WorkerResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match WorkerResponse::read_from(self.stdout) {
            Ok(WorkerResponse::EndOfDefs) => {
                self.done = true;
                None
            }
            Ok(fact) => Some(Ok(fact)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
