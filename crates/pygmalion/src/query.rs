//! The query surface: client intents translated into store requests.
//!
//! Cursor-oriented operations first resolve "what symbol is at this point?"
//! through the range-containment lookup, then walk the symbol graph from
//! the resolved USR. Everything here is read-only and answered by the
//! writer thread through the query channel.

use crate::model::{CommandInfo, DefInfo, SourceLocation, SourceRange};
use crate::scheduler::{reply_slot, QueryRequest, RequestChannels};

/// Handle for issuing reads against the store.
#[derive(Debug, Clone)]
pub struct Queries {
    channels: RequestChannels,
}

impl Queries {
    #[must_use]
    pub fn new(channels: RequestChannels) -> Self {
        Self { channels }
    }

    /// Definitions of the symbols referenced at a cursor position.
    #[must_use]
    pub fn referenced_at(&self, loc: SourceLocation) -> Vec<DefInfo> {
        let (slot, reply) = reply_slot();
        self.channels.send_query(QueryRequest::Referenced(loc, slot));
        reply.wait().unwrap_or_default()
    }

    /// Definition-at-cursor: resolve the reference under `loc`, then jump to
    /// the definition of the first resolved symbol.
    #[must_use]
    pub fn definition_at(&self, loc: SourceLocation) -> Vec<DefInfo> {
        self.referenced_at(loc)
    }

    #[must_use]
    pub fn definition(&self, usr: &str) -> Option<DefInfo> {
        let (slot, reply) = reply_slot();
        self.channels
            .send_query(QueryRequest::Definition(usr.to_string(), slot));
        reply.wait().flatten()
    }

    #[must_use]
    pub fn callers(&self, usr: &str) -> Vec<DefInfo> {
        self.defs_query(usr, QueryRequest::Callers)
    }

    #[must_use]
    pub fn callees(&self, usr: &str) -> Vec<DefInfo> {
        self.defs_query(usr, QueryRequest::Callees)
    }

    #[must_use]
    pub fn bases(&self, usr: &str) -> Vec<DefInfo> {
        self.defs_query(usr, QueryRequest::Bases)
    }

    #[must_use]
    pub fn overrides(&self, usr: &str) -> Vec<DefInfo> {
        self.defs_query(usr, QueryRequest::Overrides)
    }

    #[must_use]
    pub fn references(&self, usr: &str) -> Vec<SourceRange> {
        let (slot, reply) = reply_slot();
        self.channels
            .send_query(QueryRequest::Refs(usr.to_string(), slot));
        reply.wait().unwrap_or_default()
    }

    #[must_use]
    pub fn command_info(&self, file: &str) -> Option<CommandInfo> {
        let (slot, reply) = reply_slot();
        self.channels
            .send_query(QueryRequest::CommandInfo(file.to_string(), slot));
        reply.wait().flatten()
    }

    #[must_use]
    pub fn includers(&self, file: &str) -> Vec<CommandInfo> {
        let (slot, reply) = reply_slot();
        self.channels
            .send_query(QueryRequest::Includers(file.to_string(), slot));
        reply.wait().unwrap_or_default()
    }

    #[must_use]
    pub fn similar_command_info(&self, file: &str) -> Option<CommandInfo> {
        let (slot, reply) = reply_slot();
        self.channels
            .send_query(QueryRequest::SimilarCommandInfo(file.to_string(), slot));
        reply.wait().flatten()
    }

    /// Compile flags for a file, by fallback chain: the file's own observed
    /// command; failing that, the command of any translation unit that
    /// includes it (headers); failing that, a sibling-directory match.
    #[must_use]
    pub fn compile_flags(&self, file: &str) -> Option<CommandInfo> {
        if let Some(ci) = self.command_info(file) {
            return Some(ci);
        }
        if let Some(ci) = self.includers(file).into_iter().next() {
            return Some(ci);
        }
        self.similar_command_info(file)
    }

    /// Every recorded build invocation (the compile-commands export input).
    #[must_use]
    pub fn all_source_files(&self) -> Vec<CommandInfo> {
        let (slot, reply) = reply_slot();
        self.channels.send_query(QueryRequest::AllSourceFiles(slot));
        reply.wait().unwrap_or_default()
    }

    fn defs_query(
        &self,
        usr: &str,
        make: impl FnOnce(String, crate::scheduler::ReplySlot<Vec<DefInfo>>) -> QueryRequest,
    ) -> Vec<DefInfo> {
        let (slot, reply) = reply_slot();
        self.channels.send_query(make(usr.to_string(), slot));
        reply.wait().unwrap_or_default()
    }
}
