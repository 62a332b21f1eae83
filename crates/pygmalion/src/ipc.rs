//! Client/daemon RPC over a Unix-domain socket at the project root.
//!
//! One request, one response, one connection: the client writes a single
//! JSON line and reads a single JSON line back. The daemon side lives in
//! `pygd`; this module holds the message types and the framing helpers both
//! ends share (including the build observer, which reports commands through
//! the same socket).

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{CommandInfo, DefInfo, SourceRange};

/// Name of the daemon's socket file, at the project root.
pub const SOCKET_FILE: &str = ".pygmalion.sock";

/// The socket path for a project root.
#[must_use]
pub fn socket_path(project_root: &Path) -> PathBuf {
    project_root.join(SOCKET_FILE)
}

/// Requests a client may issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum RpcRequest {
    /// Definition of the symbol at a cursor.
    Definition { file: String, line: u32, col: u32 },
    /// Callers of the symbol at a cursor.
    Callers { file: String, line: u32, col: u32 },
    /// Callees of the symbol at a cursor.
    Callees { file: String, line: u32, col: u32 },
    /// Base methods of the symbol at a cursor.
    Bases { file: String, line: u32, col: u32 },
    /// Overriders of the symbol at a cursor.
    Overrides { file: String, line: u32, col: u32 },
    /// Reference extents of the symbol at a cursor.
    References { file: String, line: u32, col: u32 },
    /// Compile flags for a file (own command, includer, or sibling).
    CompileFlags { file: String },
    /// Record a build invocation and queue the unit for indexing.
    Index {
        file: String,
        directory: String,
        command: String,
        args: Vec<String>,
    },
    /// Stop the daemon.
    Stop,
}

/// Responses the daemon sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum RpcResponse {
    Defs { defs: Vec<DefInfo> },
    Ranges { ranges: Vec<SourceRange> },
    Flags { command: Option<CommandInfo> },
    Ok,
    Error { message: String },
}

/// Write one message as a JSON line.
pub fn write_message<W: Write, T: Serialize>(w: &mut W, message: &T) -> Result<()> {
    let mut line = serde_json::to_string(message)
        .map_err(|e| Error::Protocol(format!("RPC encode failed: {e}")))?;
    line.push('\n');
    w.write_all(line.as_bytes())?;
    w.flush()?;
    Ok(())
}

/// Read one JSON-line message.
pub fn read_message<R: BufRead, T: for<'de> Deserialize<'de>>(r: &mut R) -> Result<T> {
    let mut line = String::new();
    let n = r.read_line(&mut line)?;
    if n == 0 {
        return Err(Error::Protocol("RPC peer closed the connection".to_string()));
    }
    serde_json::from_str(line.trim_end())
        .map_err(|e| Error::Protocol(format!("RPC decode failed: {e}")))
}

/// Issue one request against the daemon serving `project_root`.
pub fn request(project_root: &Path, request: &RpcRequest) -> Result<RpcResponse> {
    let path = socket_path(project_root);
    let mut stream = UnixStream::connect(&path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("cannot reach daemon at {}: {e}", path.display()),
        ))
    })?;

    write_message(&mut stream, request)?;
    let mut reader = BufReader::new(stream);
    read_message(&mut reader)
}
