//! # Pygmalion: per-project code intelligence for C/C++
//!
//! Pygmalion observes build invocations, parses each translation unit with a
//! semantic-index worker, and persists the resulting symbol facts in an
//! embedded `SQLite` store so that interactive queries (go-to-definition,
//! callers, callees, base methods, overrides, references, the inclusion
//! graph, and `compile_commands.json` export) are answered in milliseconds.
//!
//! ## Architecture
//!
//! ```text
//! pygmake ── CC/CXX ──> pygscan ──┐
//!                                 │ socket (.pygmalion.sock)
//! pygmalion client ───────────────┤
//!                                 v
//!                               pygd ── stdio protocol ──> pygclangindex (xN)
//!                                 │
//!                update channel   │   query channel
//!                        └──> writer thread <──┘
//!                                 │
//!                         .pygmalion.sqlite
//! ```
//!
//! One writer thread owns the store; indexer host threads and the socket
//! listener talk to it through the two request channels of [`scheduler`].

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod hash;
pub mod indexer;
pub mod ipc;
pub mod model;
pub mod query;
pub mod scheduler;
pub mod wire;
pub mod worker;

pub use config::{Config, LogLevel, CONFIG_FILE};
pub use db::{Store, StoreVersion, CURRENT_VERSION};
pub use error::{Error, Result};
pub use model::{
    CallEdge, CommandInfo, DefInfo, Inclusion, OverrideInfo, Reference, SourceLocation,
    SourceRange,
};
pub use query::Queries;
pub use scheduler::{reply_slot, QueryRequest, RequestChannels, UpdateRequest};

/// File name of the store, at the project root.
pub const STORE_FILE: &str = ".pygmalion.sqlite";
