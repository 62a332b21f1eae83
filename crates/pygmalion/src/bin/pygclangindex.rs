//! `pygclangindex` - the semantic-index worker.
//!
//! Speaks the turn-based binary protocol on its standard streams: one
//! `Analyze` request in, fact responses out, `EndOfDefs` to close the turn.
//! The daemon runs one of these per indexing thread and restarts any that
//! exits outside `Shutdown`.

use std::io::{BufWriter, Write};
use std::process::ExitCode;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pygmalion::wire::{WorkerRequest, WorkerResponse};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match serve() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            warn!(error = %e, "worker exiting on protocol failure");
            ExitCode::FAILURE
        }
    }
}

fn serve() -> pygmalion::Result<()> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let stdout = std::io::stdout();
    let mut output = BufWriter::new(stdout.lock());

    loop {
        let request = match WorkerRequest::read_from(&mut input)? {
            Some(request) => request,
            // EOF from the daemon is a shutdown
            None => return Ok(()),
        };

        match request {
            WorkerRequest::Analyze(ci) => {
                info!(file = %ci.file, "analysis requested");
                // Translation-unit parsing binds to the host's libclang and
                // is wired in by the packaging layer; a bare build answers
                // every unit with an empty fact stream.
                warn!(file = %ci.file, "no semantic backend linked, returning no facts");
                WorkerResponse::EndOfDefs.write_to(&mut output)?;
                output.flush()?;
            }
            WorkerRequest::Shutdown => return Ok(()),
        }
    }
}
