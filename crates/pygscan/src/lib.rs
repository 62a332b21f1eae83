//! Build observation: recognizing compile invocations and reporting them to
//! the daemon.
//!
//! `pygscan` stands in for the compiler during an observed build: it records
//! the command line for every source file being compiled, reports it over
//! the project socket, and forwards the invocation to the real compiler.
//! Failing to reach the daemon never breaks the build.

use std::path::Path;

use tracing::{debug, warn};

use pygmalion::ipc::{self, RpcRequest, RpcResponse};

/// Environment variables naming the real compilers behind the shim.
pub const ENV_CC: &str = "PYGMALION_CC";
pub const ENV_CXX: &str = "PYGMALION_CXX";

/// Which compiler family a shim invocation stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerKind {
    C,
    Cxx,
}

impl CompilerKind {
    /// The real compiler to forward to, from the environment with a
    /// conventional fallback.
    #[must_use]
    pub fn real_compiler(self) -> String {
        match self {
            Self::C => std::env::var(ENV_CC).unwrap_or_else(|_| "cc".to_string()),
            Self::Cxx => std::env::var(ENV_CXX).unwrap_or_else(|_| "c++".to_string()),
        }
    }
}

/// `true` for arguments that name a translation unit's main file.
#[must_use]
pub fn is_source_file(arg: &str) -> bool {
    let lower = arg.to_lowercase();
    [".c", ".cc", ".cpp", ".cxx", ".m", ".mm"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

/// Report one compile invocation to the daemon, one request per source file
/// named in the arguments.
///
/// Best-effort: an unreachable daemon is logged and ignored so the build
/// keeps running.
pub fn report_invocation(project_root: &Path, compiler: &str, args: &[String]) {
    let directory = match std::env::current_dir() {
        Ok(dir) => dir.display().to_string(),
        Err(e) => {
            warn!(error = %e, "cannot determine working directory, not reporting");
            return;
        }
    };

    for file in args.iter().filter(|a| is_source_file(a)) {
        let request = RpcRequest::Index {
            file: file.clone(),
            directory: directory.clone(),
            command: compiler.to_string(),
            args: args.to_vec(),
        };
        match ipc::request(project_root, &request) {
            Ok(RpcResponse::Ok) => debug!(file = %file, "command reported"),
            Ok(other) => warn!(file = %file, ?other, "unexpected daemon reply"),
            Err(e) => warn!(file = %file, error = %e, "daemon unreachable, build continues"),
        }
    }
}

/// The project root the observer reports into: an explicit override, else
/// the working directory.
#[must_use]
pub fn project_root() -> std::path::PathBuf {
    std::env::var_os("PYGMALION_PROJECT").map_or_else(
        || std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from(".")),
        std::path::PathBuf::from,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_file_detection_covers_the_usual_extensions() {
        assert!(is_source_file("main.c"));
        assert!(is_source_file("widget.cc"));
        assert!(is_source_file("src/engine.cpp"));
        assert!(is_source_file("LOUD.CXX"));
        assert!(!is_source_file("header.hpp"));
        assert!(!is_source_file("-O2"));
        assert!(!is_source_file("libfoo.a"));
    }
}
