//! `pygmake` - run the user's build with the compilers redirected through
//! `pygscan`.
//!
//! Expands the configured `make` template (`$(args)`, `$(projectroot)`) and
//! runs it with `CC`/`CXX` pointing at the shim, so every compile lands in
//! the daemon as a build observation.

use std::process::{Command, ExitCode};

use colored::Colorize;
use tracing_subscriber::EnvFilter;

use pygmalion::Config;
use pygscan::{ENV_CC, ENV_CXX};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let project_root = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("{}: failed to get current directory: {e}", "error".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let config = match Config::load(&project_root) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command_line = config.make_command(&args, &project_root);

    let shim = match std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("pygscan")))
    {
        Some(path) => path,
        None => {
            eprintln!("{}: cannot locate pygscan next to pygmake", "error".red().bold());
            return ExitCode::FAILURE;
        }
    };
    let shim = shim.display();

    // Preserve the user's compiler choice for the shim to forward to.
    let real_cc = std::env::var("CC").unwrap_or_else(|_| "cc".to_string());
    let real_cxx = std::env::var("CXX").unwrap_or_else(|_| "c++".to_string());

    let status = Command::new("sh")
        .arg("-c")
        .arg(&command_line)
        .current_dir(&project_root)
        .env(ENV_CC, real_cc)
        .env(ENV_CXX, real_cxx)
        .env("PYGMALION_PROJECT", &project_root)
        .env("CC", format!("{shim} --cc"))
        .env("CXX", format!("{shim} --cxx"))
        .status();

    match status {
        Ok(status) if status.success() => ExitCode::SUCCESS,
        Ok(status) => ExitCode::from(status.code().unwrap_or(1).clamp(0, 255) as u8),
        Err(e) => {
            eprintln!("{}: cannot run build: {e}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}
