//! `pygd` - the Pygmalion daemon.
//!
//! Owns the project's store, the writer thread, the indexing pool, and the
//! Unix socket that clients and the build observer talk to.

use std::io::BufReader;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;
use colored::Colorize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pygmalion::indexer::{IndexerPool, PoolWatch};
use pygmalion::ipc::{self, RpcRequest, RpcResponse};
use pygmalion::scheduler::{spawn_writer, UpdateRequest};
use pygmalion::{export, Config, CommandInfo, Queries, SourceLocation, Store, STORE_FILE};

/// Store-open retry policy for racing a previous daemon instance that still
/// holds the exclusive lock.
const OPEN_ATTEMPTS: u32 = 100;
const OPEN_BACKOFF: Duration = Duration::from_millis(500);

/// Pygmalion daemon: indexes build observations, answers symbol queries.
#[derive(Parser)]
#[command(name = "pygd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Project root directory (defaults to current directory)
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let project_root = match cli.project {
        Some(p) => p,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("{}: failed to get current directory: {e}", "error".red().bold());
                return ExitCode::FAILURE;
            }
        },
    };

    let config = match Config::load(&project_root) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config, cli.verbose);

    match run(&project_root, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "daemon failed");
            eprintln!("{}: {e}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &Config, verbosity: u8) {
    let base = match verbosity {
        0 => config.log_level.as_filter(),
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base)))
        .with_target(false)
        .init();
}

fn run(project_root: &Path, config: &Config) -> pygmalion::Result<()> {
    let store_path = project_root.join(STORE_FILE);
    let store = Store::open_with_retry(&store_path, OPEN_ATTEMPTS, OPEN_BACKOFF)?;
    info!(store = %store_path.display(), "store opened");

    let (channels, writer) = spawn_writer(store);
    let queries = Queries::new(channels.clone());

    let pool = IndexerPool::new(
        config.effective_indexing_threads(),
        worker_executable()?,
        channels.clone(),
    );

    // Auto-regeneration after each indexing batch settles.
    let settle_handle = spawn_settle_watcher(
        pool.watch(),
        queries.clone(),
        project_root.to_path_buf(),
        config.clone(),
    );

    let socket = ipc::socket_path(project_root);
    // A stale socket from a crashed instance would make bind fail.
    let _ = std::fs::remove_file(&socket);
    let listener = UnixListener::bind(&socket)?;
    info!(socket = %socket.display(), "listening");

    for stream in listener.incoming() {
        let mut stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        match serve_connection(&mut stream, &queries, &pool, &channels) {
            Ok(keep_running) if !keep_running => break,
            Ok(_) => {}
            Err(e) => warn!(error = %e, "client connection failed"),
        }
    }

    info!("shutting down");
    pool.join();
    channels.send_update(UpdateRequest::Shutdown);
    if writer.join().is_err() {
        error!("writer thread panicked during shutdown");
    }
    drop(settle_handle);
    let _ = std::fs::remove_file(&socket);
    Ok(())
}

/// The worker executable ships next to the daemon binary.
fn worker_executable() -> pygmalion::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe.parent().ok_or_else(|| {
        pygmalion::Error::Internal("daemon executable has no parent directory".to_string())
    })?;
    Ok(dir.join("pygclangindex"))
}

/// Handle one client connection. Returns `false` when the daemon should stop.
fn serve_connection(
    stream: &mut UnixStream,
    queries: &Queries,
    pool: &IndexerPool,
    channels: &pygmalion::RequestChannels,
) -> pygmalion::Result<bool> {
    let request: RpcRequest = {
        let mut reader = BufReader::new(&mut *stream);
        ipc::read_message(&mut reader)?
    };

    let at = |file: String, line: u32, col: u32| SourceLocation { file, line, col };

    let response = match request {
        RpcRequest::Definition { file, line, col } => RpcResponse::Defs {
            defs: queries.definition_at(at(file, line, col)),
        },
        RpcRequest::Callers { file, line, col } => RpcResponse::Defs {
            defs: graph_at(queries, at(file, line, col), Queries::callers),
        },
        RpcRequest::Callees { file, line, col } => RpcResponse::Defs {
            defs: graph_at(queries, at(file, line, col), Queries::callees),
        },
        RpcRequest::Bases { file, line, col } => RpcResponse::Defs {
            defs: graph_at(queries, at(file, line, col), Queries::bases),
        },
        RpcRequest::Overrides { file, line, col } => RpcResponse::Defs {
            defs: graph_at(queries, at(file, line, col), Queries::overrides),
        },
        RpcRequest::References { file, line, col } => {
            let ranges = queries
                .referenced_at(at(file, line, col))
                .first()
                .map(|def| queries.references(&def.usr))
                .unwrap_or_default();
            RpcResponse::Ranges { ranges }
        }
        RpcRequest::CompileFlags { file } => RpcResponse::Flags {
            command: queries.compile_flags(&file),
        },
        RpcRequest::Index {
            file,
            directory,
            command,
            args,
        } => {
            let ci = CommandInfo {
                file,
                working_dir: directory,
                command,
                args,
                last_indexed: epoch_seconds(),
            };
            info!(file = %ci.file, "build observation received");
            channels.send_update(UpdateRequest::CommandInfo(ci.clone()));
            pool.dispatch(ci);
            RpcResponse::Ok
        }
        RpcRequest::Stop => {
            ipc::write_message(stream, &RpcResponse::Ok)?;
            return Ok(false);
        }
    };

    ipc::write_message(stream, &response)?;
    Ok(true)
}

/// Resolve the symbol at a cursor, then walk one graph edge from it.
fn graph_at(
    queries: &Queries,
    loc: SourceLocation,
    walk: impl Fn(&Queries, &str) -> Vec<pygmalion::DefInfo>,
) -> Vec<pygmalion::DefInfo> {
    queries
        .referenced_at(loc)
        .first()
        .map(|def| walk(queries, &def.usr))
        .unwrap_or_default()
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Regenerate the compilation database and the tags file whenever an
/// indexing batch settles. Best-effort: failures are logged, never fatal.
fn spawn_settle_watcher(
    watch: PoolWatch,
    queries: Queries,
    project_root: PathBuf,
    config: Config,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while watch.wait_settled().is_some() {
            if config.compilation_database {
                let commands = queries.all_source_files();
                if let Err(e) = export::write_compile_commands(&commands, &project_root) {
                    warn!(error = %e, "compilation database export failed");
                }
            }
            if config.tags {
                regenerate_tags(&project_root);
            }
        }
    })
}

fn regenerate_tags(project_root: &Path) {
    match std::process::Command::new("ctags")
        .arg("-R")
        .current_dir(project_root)
        .status()
    {
        Ok(status) if status.success() => info!("tags regenerated"),
        Ok(status) => warn!(%status, "ctags exited with failure"),
        Err(e) => warn!(error = %e, "ctags not runnable, skipping tags"),
    }
}
