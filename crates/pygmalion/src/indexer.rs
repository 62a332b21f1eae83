//! The indexing pool: host threads that drive worker subprocesses and relay
//! their facts onto the update channel.
//!
//! Each host thread owns at most one worker subprocess. Workers are spawned
//! lazily on the first job and respawned lazily after a failure. For every
//! translation unit the host submits `ResetMetadata` before any of that
//! unit's facts, so the writer observes them in that order by channel FIFO.
//!
//! When a unit's parse reports an inclusion of a file never seen before, the
//! host queues that header for indexing too, under a command line borrowed
//! through the compile-flags fallback chain. The "never seen before" test is
//! the atomic `InsertFileAndCheck` primitive, submitted ahead of the
//! inclusion fact so the dedupe observes pre-inclusion state.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::model::{CommandInfo, Inclusion};
use crate::query::Queries;
use crate::scheduler::{reply_slot, RequestChannels, UpdateRequest};
use crate::wire::WorkerResponse;
use crate::worker::Worker;

enum Job {
    Index(CommandInfo),
    Stop,
}

/// Cloneable dispatch handle shared by the pool front and its host threads.
#[derive(Clone)]
struct Dispatcher {
    jobs: Sender<Job>,
    in_flight: Arc<AtomicUsize>,
}

impl Dispatcher {
    fn dispatch(&self, ci: CommandInfo) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.jobs.send(Job::Index(ci)).is_err() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            warn!("index job dropped: pool is shutting down");
        }
    }
}

/// Observer handle for "has the current indexing batch settled?".
#[derive(Clone)]
pub struct PoolWatch {
    completions: Receiver<String>,
    in_flight: Arc<AtomicUsize>,
}

impl PoolWatch {
    /// Block until a batch settles: some job finished and nothing is queued
    /// or running. Returns `None` once the pool is gone.
    pub fn wait_settled(&self) -> Option<()> {
        loop {
            self.completions.recv().ok()?;
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return Some(());
            }
        }
    }
}

/// A pool of indexing host threads.
pub struct IndexerPool {
    dispatcher: Dispatcher,
    watch: PoolWatch,
    threads: usize,
    handles: Vec<JoinHandle<()>>,
}

impl IndexerPool {
    /// Start `threads` host threads that spawn workers from `worker_exe` and
    /// feed facts into `channels`.
    #[must_use]
    pub fn new(threads: usize, worker_exe: PathBuf, channels: RequestChannels) -> Self {
        let threads = threads.max(1);
        let (jobs_tx, jobs_rx) = unbounded::<Job>();
        let (done_tx, done_rx) = unbounded::<String>();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher {
            jobs: jobs_tx,
            in_flight: Arc::clone(&in_flight),
        };

        let handles = (0..threads)
            .map(|_| {
                let jobs = jobs_rx.clone();
                let done = done_tx.clone();
                let exe = worker_exe.clone();
                let channels = channels.clone();
                let dispatcher = dispatcher.clone();
                std::thread::spawn(move || host_loop(&jobs, &done, &exe, &channels, &dispatcher))
            })
            .collect();

        info!(threads, worker = %worker_exe.display(), "indexing pool started");
        Self {
            dispatcher,
            watch: PoolWatch {
                completions: done_rx,
                in_flight,
            },
            threads,
            handles,
        }
    }

    /// Queue one translation unit for (re-)indexing.
    pub fn dispatch(&self, ci: CommandInfo) {
        self.dispatcher.dispatch(ci);
    }

    /// Settle observer for auto-regeneration hooks.
    #[must_use]
    pub fn watch(&self) -> PoolWatch {
        self.watch.clone()
    }

    /// Finish already-queued jobs, shut the workers down, and join.
    pub fn join(self) {
        for _ in 0..self.threads {
            let _ = self.dispatcher.jobs.send(Job::Stop);
        }
        for handle in self.handles {
            if handle.join().is_err() {
                error!("indexer host thread panicked");
            }
        }
    }
}

fn host_loop(
    jobs: &Receiver<Job>,
    completions: &Sender<String>,
    worker_exe: &std::path::Path,
    channels: &RequestChannels,
    dispatcher: &Dispatcher,
) {
    let queries = Queries::new(channels.clone());
    let mut worker: Option<Worker> = None;

    while let Ok(job) = jobs.recv() {
        let ci = match job {
            Job::Index(ci) => ci,
            Job::Stop => break,
        };
        worker = index_one(worker, worker_exe, &ci, channels, dispatcher, &queries);
        dispatcher.in_flight.fetch_sub(1, Ordering::SeqCst);
        let _ = completions.send(ci.file);
    }

    if let Some(w) = worker {
        w.shutdown();
    }
}

/// Run one analysis turn, lazily (re)spawning the worker.
///
/// Returns the worker to keep for the next job, or `None` when it failed and
/// must be respawned on the next dispatch.
fn index_one(
    worker: Option<Worker>,
    worker_exe: &std::path::Path,
    ci: &CommandInfo,
    channels: &RequestChannels,
    dispatcher: &Dispatcher,
    queries: &Queries,
) -> Option<Worker> {
    let mut worker = match worker {
        Some(w) => w,
        None => match Worker::spawn(worker_exe) {
            Ok(w) => w,
            Err(e) => {
                error!(file = %ci.file, error = %e, "cannot spawn worker, job abandoned");
                return None;
            }
        },
    };

    // Reset precedes this unit's facts on the update channel (FIFO).
    channels.send_update(UpdateRequest::ResetMetadata(ci.file.clone()));

    let facts = match worker.analyze(ci) {
        Ok(facts) => facts,
        Err(e) => {
            warn!(file = %ci.file, error = %e, "worker request failed, respawning lazily");
            worker.discard();
            return None;
        }
    };

    let mut relayed = 0usize;
    let mut discovered: Vec<Inclusion> = Vec::new();
    let mut failed = false;
    for fact in facts {
        match fact {
            Ok(WorkerResponse::FoundInclusion(inc)) => {
                discovered.push(inc);
                relayed += 1;
            }
            Ok(response) => {
                channels.send_update(fact_to_update(response));
                relayed += 1;
            }
            Err(e) => {
                // Desynchronized or dead worker: abandon this unit's rest.
                warn!(file = %ci.file, error = %e, "worker stream failed mid-unit");
                failed = true;
                break;
            }
        }
    }

    if failed {
        worker.discard();
        return None;
    }

    // Inclusions are relayed after the turn so the header dedupe below never
    // blocks the worker's stream.
    for inc in discovered {
        let header = inc.included.clone();
        let (slot, first_sighting) = reply_slot();
        channels.send_update(UpdateRequest::InsertFileAndCheck(header.clone(), slot));
        channels.send_update(UpdateRequest::Inclusion(inc));

        if first_sighting.wait() == Some(true) {
            if let Some(mut borrowed) = queries.compile_flags(&header) {
                debug!(header = %header, donor = %borrowed.file, "queueing discovered header");
                borrowed.file = header;
                dispatcher.dispatch(borrowed);
            }
        }
    }

    debug!(file = %ci.file, facts = relayed, "translation unit indexed");
    Some(worker)
}

fn fact_to_update(response: WorkerResponse) -> UpdateRequest {
    match response {
        WorkerResponse::FoundDef(def) => UpdateRequest::Def(def),
        WorkerResponse::FoundInclusion(inc) => UpdateRequest::Inclusion(inc),
        WorkerResponse::FoundOverride(ov) => UpdateRequest::Override(ov),
        WorkerResponse::FoundCaller(edge) => UpdateRequest::Caller(edge),
        WorkerResponse::FoundRef(reference) => UpdateRequest::Ref(reference),
        WorkerResponse::EndOfDefs => {
            unreachable!("EndOfDefs is consumed by the fact stream")
        }
    }
}
