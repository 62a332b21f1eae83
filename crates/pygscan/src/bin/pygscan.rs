//! `pygscan` - compiler impersonation shim.
//!
//! Invoked as `pygscan --cc <args>...` or `pygscan --cxx <args>...` (the
//! forms `pygmake` injects into `CC`/`CXX`). Records the invocation with the
//! daemon, then execs the real compiler and propagates its exit status.

use std::process::{Command, ExitCode};

use colored::Colorize;
use tracing_subscriber::EnvFilter;

use pygscan::{project_root, report_invocation, CompilerKind};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut argv = std::env::args().skip(1);
    let kind = match argv.next().as_deref() {
        Some("--cc") => CompilerKind::C,
        Some("--cxx") => CompilerKind::Cxx,
        _ => {
            eprintln!(
                "{}: usage: pygscan --cc|--cxx <compiler arguments>",
                "error".red().bold()
            );
            return ExitCode::FAILURE;
        }
    };
    let args: Vec<String> = argv.collect();

    let compiler = kind.real_compiler();
    report_invocation(&project_root(), &compiler, &args);

    match Command::new(&compiler).args(&args).status() {
        Ok(status) => {
            if status.success() {
                ExitCode::SUCCESS
            } else {
                // Mirror the compiler's failure so the build system reacts
                ExitCode::from(status.code().unwrap_or(1).clamp(0, 255) as u8)
            }
        }
        Err(e) => {
            eprintln!("{}: cannot run {compiler}: {e}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}
