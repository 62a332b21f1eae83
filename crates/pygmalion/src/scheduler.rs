//! Dual-channel request arbiter and single-writer database thread.
//!
//! Exactly one thread, spawned by [`spawn_writer`], owns the [`Store`].
//! Everyone else talks to it over two unbounded FIFOs: heavy indexing
//! traffic on the update channel, latency-sensitive client traffic on the
//! query channel. The writer drains both with an update-biased preference
//! that still guarantees a queued query is serviced at least once every
//! [`QUERY_PREFERENCE_PERIOD`] operations, and immediately whenever updates
//! are idle.

use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::db::Store;
use crate::model::{
    CallEdge, CommandInfo, DefInfo, Inclusion, OverrideInfo, Reference, SourceLocation,
    SourceRange,
};

/// On iteration `n`, prefer the query channel iff `n` is a multiple of this.
/// Yields a roughly 9:1 update-biased schedule.
const QUERY_PREFERENCE_PERIOD: u64 = 10;

/// The writer logs throughput every this many handled requests.
const THROUGHPUT_LOG_PERIOD: u64 = 1000;

/// Producer half of a single-shot reply.
///
/// The writer fulfils the slot after executing the request. Posting into a
/// slot whose consumer has gone away is fine (cancellation); failing to post
/// (dropping the slot) is how a failed operation reads as a negative result.
#[derive(Debug)]
pub struct ReplySlot<T>(Sender<T>);

impl<T> ReplySlot<T> {
    /// Fulfil the reply. Consumes the slot: replies are single-shot.
    pub fn post(self, value: T) {
        let _ = self.0.send(value);
    }
}

/// Consumer half of a single-shot reply.
#[derive(Debug)]
pub struct Reply<T>(Receiver<T>);

impl<T> Reply<T> {
    /// Block until the writer posts a value.
    ///
    /// `None` means the writer dropped the slot: either the operation failed
    /// (the daemon favours liveness, see the error design) or the writer
    /// shut down before reaching the request.
    pub fn wait(self) -> Option<T> {
        self.0.recv().ok()
    }
}

/// A fresh single-shot reply pair.
#[must_use]
pub fn reply_slot<T>() -> (ReplySlot<T>, Reply<T>) {
    let (tx, rx) = bounded(1);
    (ReplySlot(tx), Reply(rx))
}

/// Write-side request verbs.
#[derive(Debug)]
pub enum UpdateRequest {
    CommandInfo(CommandInfo),
    Def(DefInfo),
    Override(OverrideInfo),
    Caller(CallEdge),
    Ref(Reference),
    Inclusion(Inclusion),
    /// Drop a translation unit's derived metadata before replaying it.
    ResetMetadata(String),
    /// Record a path; replies `true` iff it was previously unknown.
    InsertFileAndCheck(String, ReplySlot<bool>),
    /// Finish in-flight work, answer already-queued queries, and exit.
    Shutdown,
}

/// Read-side request verbs. Every variant carries its reply slot.
#[derive(Debug)]
pub enum QueryRequest {
    CommandInfo(String, ReplySlot<Option<CommandInfo>>),
    SimilarCommandInfo(String, ReplySlot<Option<CommandInfo>>),
    Definition(String, ReplySlot<Option<DefInfo>>),
    Includers(String, ReplySlot<Vec<CommandInfo>>),
    Callers(String, ReplySlot<Vec<DefInfo>>),
    Callees(String, ReplySlot<Vec<DefInfo>>),
    Bases(String, ReplySlot<Vec<DefInfo>>),
    Overrides(String, ReplySlot<Vec<DefInfo>>),
    Refs(String, ReplySlot<Vec<SourceRange>>),
    Referenced(SourceLocation, ReplySlot<Vec<DefInfo>>),
    /// Every recorded build invocation; backs the compile-commands export.
    AllSourceFiles(ReplySlot<Vec<CommandInfo>>),
}

/// Cloneable sending side of both request channels.
#[derive(Debug, Clone)]
pub struct RequestChannels {
    updates: Sender<UpdateRequest>,
    queries: Sender<QueryRequest>,
}

impl RequestChannels {
    /// Enqueue a write. Never blocks (the channel is unbounded).
    pub fn send_update(&self, request: UpdateRequest) {
        if self.updates.send(request).is_err() {
            warn!("update dropped: writer thread has exited");
        }
    }

    /// Enqueue a read. Never blocks (the channel is unbounded).
    pub fn send_query(&self, request: QueryRequest) {
        if self.queries.send(request).is_err() {
            warn!("query dropped: writer thread has exited");
        }
    }
}

/// Start the writer thread that owns `store`.
///
/// Returns the request channels and the writer's join handle. The writer
/// exits when it dequeues [`UpdateRequest::Shutdown`] or when every
/// [`RequestChannels`] clone has been dropped.
pub fn spawn_writer(store: Store) -> (RequestChannels, JoinHandle<()>) {
    let (update_tx, update_rx) = unbounded();
    let (query_tx, query_rx) = unbounded();

    let handle = thread::spawn(move || writer_loop(store, &update_rx, &query_rx));

    (
        RequestChannels {
            updates: update_tx,
            queries: query_tx,
        },
        handle,
    )
}

/// A request dequeued from one of the two channels.
enum Serviced {
    Update(UpdateRequest),
    Query(QueryRequest),
}

/// Read one of two channels, preferring one but falling back to the other.
///
/// Takes from the preferred channel when it has an item ready; otherwise
/// blocks on both and returns whichever produces first. Also returns the
/// post-read length of the chosen channel, for diagnostics. `None` means
/// both channels are disconnected.
fn recv_preferring(
    updates: &Receiver<UpdateRequest>,
    queries: &Receiver<QueryRequest>,
    prefer_queries: bool,
) -> Option<(Serviced, usize)> {
    if prefer_queries {
        if let Ok(q) = queries.try_recv() {
            return Some((Serviced::Query(q), queries.len()));
        }
    } else if let Ok(u) = updates.try_recv() {
        return Some((Serviced::Update(u), updates.len()));
    }

    select! {
        recv(updates) -> msg => match msg {
            Ok(u) => Some((Serviced::Update(u), updates.len())),
            // updates closed: only queries can still produce
            Err(_) => queries.recv().ok().map(|q| {
                let backlog = queries.len();
                (Serviced::Query(q), backlog)
            }),
        },
        recv(queries) -> msg => match msg {
            Ok(q) => Some((Serviced::Query(q), queries.len())),
            Err(_) => updates.recv().ok().map(|u| {
                let backlog = updates.len();
                (Serviced::Update(u), backlog)
            }),
        },
    }
}

fn writer_loop(
    mut store: Store,
    updates: &Receiver<UpdateRequest>,
    queries: &Receiver<QueryRequest>,
) {
    let mut handled: u64 = 0;
    let mut window_start = Instant::now();

    loop {
        let prefer_queries = handled % QUERY_PREFERENCE_PERIOD == 0;
        let Some((request, backlog)) = recv_preferring(updates, queries, prefer_queries) else {
            debug!(handled, "all request channels closed, writer exiting");
            break;
        };
        handled += 1;

        match request {
            Serviced::Update(UpdateRequest::Shutdown) => {
                // Everything already queued behind the shutdown marker on
                // the query channel still gets an answer; further updates
                // are not drained.
                let mut drained = 0u64;
                while let Ok(query) = queries.try_recv() {
                    handle_query(&store, query);
                    drained += 1;
                }
                debug!(handled, drained, "shutdown requested, writer exiting");
                break;
            }
            Serviced::Update(update) => handle_update(&mut store, update),
            Serviced::Query(query) => handle_query(&store, query),
        }

        if handled % THROUGHPUT_LOG_PERIOD == 0 {
            let elapsed = window_start.elapsed();
            info!(
                handled,
                backlog,
                window_ms = elapsed.as_millis() as u64,
                "writer throughput"
            );
            window_start = Instant::now();
        }
    }
}

/// Execute one write. Failures are logged and swallowed: facts are always
/// recomputable from sources, so the daemon favours liveness over
/// correctness-by-abort.
fn handle_update(store: &mut Store, request: UpdateRequest) {
    let outcome = match request {
        UpdateRequest::CommandInfo(ci) => store.update_source_file(&ci),
        UpdateRequest::Def(def) => store.update_def(&def),
        UpdateRequest::Override(ov) => store.update_override(&ov),
        UpdateRequest::Caller(edge) => store.update_caller(&edge),
        UpdateRequest::Ref(reference) => store.update_reference(&reference),
        UpdateRequest::Inclusion(inc) => store.update_inclusion(&inc),
        UpdateRequest::ResetMetadata(file) => store.reset_metadata(&file),
        UpdateRequest::InsertFileAndCheck(file, reply) => {
            match store.insert_file_and_check(&file) {
                Ok(first) => {
                    reply.post(first);
                    Ok(())
                }
                // dropping `reply` reads as a negative result at the caller
                Err(e) => Err(e),
            }
        }
        UpdateRequest::Shutdown => unreachable!("handled by the writer loop"),
    };

    if let Err(e) = outcome {
        warn!(error = %e, "update failed, continuing");
    }
}

/// Execute one read and post its reply. On failure the slot is dropped and
/// the caller observes a negative result.
fn handle_query(store: &Store, request: QueryRequest) {
    let outcome = match request {
        QueryRequest::CommandInfo(file, reply) => {
            store.get_command_info(&file).map(|r| reply.post(r))
        }
        QueryRequest::SimilarCommandInfo(file, reply) => {
            store.get_similar_command_info(&file).map(|r| reply.post(r))
        }
        QueryRequest::Definition(usr, reply) => store.get_definition(&usr).map(|r| reply.post(r)),
        QueryRequest::Includers(file, reply) => store.get_includers(&file).map(|r| reply.post(r)),
        QueryRequest::Callers(usr, reply) => store.get_callers(&usr).map(|r| reply.post(r)),
        QueryRequest::Callees(usr, reply) => store.get_callees(&usr).map(|r| reply.post(r)),
        QueryRequest::Bases(usr, reply) => store.get_bases(&usr).map(|r| reply.post(r)),
        QueryRequest::Overrides(usr, reply) => store.get_overriders(&usr).map(|r| reply.post(r)),
        QueryRequest::Refs(usr, reply) => store.get_references(&usr).map(|r| reply.post(r)),
        QueryRequest::Referenced(loc, reply) => store.get_referenced(&loc).map(|r| reply.post(r)),
        QueryRequest::AllSourceFiles(reply) => store.all_command_infos().map(|r| reply.post(r)),
    };

    if let Err(e) = outcome {
        warn!(error = %e, "query failed, reply dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_db_path;

    fn temp_writer() -> (tempfile::TempDir, RequestChannels, JoinHandle<()>) {
        let (dir, path) = temp_db_path();
        let store = Store::open(&path).expect("should open store");
        let (channels, handle) = spawn_writer(store);
        (dir, channels, handle)
    }

    #[test]
    fn preference_flips_every_tenth_iteration() {
        let periods: Vec<bool> = (0u64..21)
            .map(|n| n % QUERY_PREFERENCE_PERIOD == 0)
            .collect();
        assert!(periods[0]);
        assert!(periods[10]);
        assert!(periods[20]);
        assert_eq!(periods.iter().filter(|p| **p).count(), 3);
    }

    #[test]
    fn recv_preferring_takes_the_preferred_channel_when_ready() {
        let (u_tx, u_rx) = unbounded();
        let (q_tx, q_rx) = unbounded::<QueryRequest>();

        u_tx.send(UpdateRequest::ResetMetadata("a.cpp".to_string())).unwrap();
        let (slot, _reply) = reply_slot();
        q_tx.send(QueryRequest::Definition("c:@x".to_string(), slot)).unwrap();

        let (got, backlog) = recv_preferring(&u_rx, &q_rx, true).expect("item");
        assert!(matches!(got, Serviced::Query(_)));
        assert_eq!(backlog, 0);

        let (got, backlog) = recv_preferring(&u_rx, &q_rx, false).expect("item");
        assert!(matches!(got, Serviced::Update(_)));
        assert_eq!(backlog, 0);
    }

    #[test]
    fn recv_preferring_falls_back_when_preferred_is_empty() {
        let (u_tx, u_rx) = unbounded();
        let (_q_tx, q_rx) = unbounded::<QueryRequest>();

        u_tx.send(UpdateRequest::ResetMetadata("a.cpp".to_string())).unwrap();

        let (got, _) = recv_preferring(&u_rx, &q_rx, true).expect("item");
        assert!(matches!(got, Serviced::Update(_)));
    }

    #[test]
    fn recv_preferring_survives_one_side_disconnecting() {
        let (u_tx, u_rx) = unbounded::<UpdateRequest>();
        let (q_tx, q_rx) = unbounded::<QueryRequest>();
        drop(q_tx);

        u_tx.send(UpdateRequest::ResetMetadata("a.cpp".to_string())).unwrap();
        let (got, _) = recv_preferring(&u_rx, &q_rx, true).expect("item");
        assert!(matches!(got, Serviced::Update(_)));
    }

    #[test]
    fn insert_file_and_check_replies_through_the_slot() {
        let (_dir, channels, handle) = temp_writer();

        let (slot, reply) = reply_slot();
        channels.send_update(UpdateRequest::InsertFileAndCheck("h.hpp".to_string(), slot));
        assert_eq!(reply.wait(), Some(true));

        let (slot, reply) = reply_slot();
        channels.send_update(UpdateRequest::InsertFileAndCheck("h.hpp".to_string(), slot));
        assert_eq!(reply.wait(), Some(false));

        channels.send_update(UpdateRequest::Shutdown);
        handle.join().expect("writer should exit cleanly");
    }

    #[test]
    fn writer_exits_when_all_channels_drop() {
        let (_dir, channels, handle) = temp_writer();
        drop(channels);
        handle.join().expect("writer should exit cleanly");
    }
}
