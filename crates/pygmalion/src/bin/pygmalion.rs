//! `pygmalion` - the interactive query client.
//!
//! Talks to a running `pygd` over the project socket. Results print to
//! standard output one record per line; an empty result set is an empty
//! output and exit 0. Daemon errors exit non-zero.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use pygmalion::ipc::{self, RpcRequest, RpcResponse};

/// Pygmalion query client.
#[derive(Parser)]
#[command(name = "pygmalion")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Project root directory (defaults to current directory)
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    /// Record a build command and queue the file for indexing:
    /// --index <compiler> <args>...
    #[arg(long, num_args = 2.., value_names = ["COMPILER", "ARGS"])]
    index: Option<Vec<String>>,

    /// Stop the daemon
    #[arg(long)]
    stop: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Definition of the symbol at a cursor
    Definition { file: String, line: u32, col: u32 },
    /// Functions calling the symbol at a cursor
    Callers { file: String, line: u32, col: u32 },
    /// Functions called by the symbol at a cursor
    Callees { file: String, line: u32, col: u32 },
    /// Base methods of the symbol at a cursor
    Bases { file: String, line: u32, col: u32 },
    /// Overriders of the symbol at a cursor
    Overrides { file: String, line: u32, col: u32 },
    /// Reference extents of the symbol at a cursor
    References { file: String, line: u32, col: u32 },
    /// Compile flags suitable for a file
    CompileFlags { file: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let project_root = match cli.project.map_or_else(std::env::current_dir, Ok) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("{}: failed to get current directory: {e}", "error".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let request = if cli.stop {
        RpcRequest::Stop
    } else if let Some(invocation) = cli.index {
        match index_request(&invocation) {
            Ok(req) => req,
            Err(message) => {
                eprintln!("{}: {message}", "error".red().bold());
                return ExitCode::FAILURE;
            }
        }
    } else {
        match cli.command {
            Some(command) => to_request(command),
            None => {
                eprintln!(
                    "{}: a subcommand, --index, or --stop is required",
                    "error".red().bold()
                );
                return ExitCode::FAILURE;
            }
        }
    };

    match ipc::request(&project_root, &request) {
        Ok(response) => print_response(&response),
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn to_request(command: Commands) -> RpcRequest {
    match command {
        Commands::Definition { file, line, col } => RpcRequest::Definition { file, line, col },
        Commands::Callers { file, line, col } => RpcRequest::Callers { file, line, col },
        Commands::Callees { file, line, col } => RpcRequest::Callees { file, line, col },
        Commands::Bases { file, line, col } => RpcRequest::Bases { file, line, col },
        Commands::Overrides { file, line, col } => RpcRequest::Overrides { file, line, col },
        Commands::References { file, line, col } => RpcRequest::References { file, line, col },
        Commands::CompileFlags { file } => RpcRequest::CompileFlags { file },
    }
}

/// Build an `Index` request from `--index <compiler> <args>...`.
///
/// The file is the first argument that looks like a C/C++ source file; the
/// working directory is the client's.
fn index_request(invocation: &[String]) -> Result<RpcRequest, String> {
    let command = invocation[0].clone();
    let args: Vec<String> = invocation[1..].to_vec();

    let file = args
        .iter()
        .find(|a| is_source_file(a))
        .cloned()
        .ok_or_else(|| "no source file in the indexed command".to_string())?;
    let directory = std::env::current_dir()
        .map_err(|e| e.to_string())?
        .display()
        .to_string();

    Ok(RpcRequest::Index {
        file,
        directory,
        command,
        args,
    })
}

fn is_source_file(arg: &str) -> bool {
    let lower = arg.to_lowercase();
    [".c", ".cc", ".cpp", ".cxx", ".m", ".mm"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

fn print_response(response: &RpcResponse) -> ExitCode {
    match response {
        RpcResponse::Defs { defs } => {
            for def in defs {
                println!("{def}");
            }
            ExitCode::SUCCESS
        }
        RpcResponse::Ranges { ranges } => {
            for range in ranges {
                println!("{range}");
            }
            ExitCode::SUCCESS
        }
        RpcResponse::Flags { command } => {
            if let Some(ci) = command {
                println!("{}", ci.command_line());
            }
            ExitCode::SUCCESS
        }
        RpcResponse::Ok => ExitCode::SUCCESS,
        RpcResponse::Error { message } => {
            eprintln!("{}: {message}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}
