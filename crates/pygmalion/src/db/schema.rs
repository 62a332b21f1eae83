//! On-disk schema for the Pygmalion store.
//!
//! Every textual key lives in a dictionary table of shape `(Hash, Text)`
//! keyed by its 64-bit fingerprint; the fact tables hold only hashes and
//! small scalars. Cross-table joins are therefore fixed-width integer
//! comparisons, and indices stay constant-size per row.
//!
//! Referential integrity is by insert ordering (dictionaries before facts),
//! not by foreign keys: edge endpoints are allowed to reference USRs whose
//! definitions arrive from a later translation unit, and queries joining to
//! `Definitions` drop dangling endpoints.

/// Schema DDL, applied idempotently on every open.
pub(crate) const SCHEMA: &str = r"
-- Tool name and schema version; a mismatch on open is fatal
CREATE TABLE IF NOT EXISTS Metadata (
    Tool TEXT PRIMARY KEY,
    Major INTEGER NOT NULL,
    Minor INTEGER NOT NULL
);

-- Dictionary tables: fingerprint -> original text
CREATE TABLE IF NOT EXISTS Files (
    Hash INTEGER PRIMARY KEY,
    Name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS Paths (
    Hash INTEGER PRIMARY KEY,
    Path TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS BuildCommands (
    Hash INTEGER PRIMARY KEY,
    Command TEXT NOT NULL
);

-- Argument vectors, stored as their canonical JSON serialization
CREATE TABLE IF NOT EXISTS BuildArgs (
    Hash INTEGER PRIMARY KEY,
    Args TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS Kinds (
    Hash INTEGER PRIMARY KEY,
    Kind TEXT NOT NULL
);

-- One observed build invocation per source file; replaced on re-observation
CREATE TABLE IF NOT EXISTS SourceFiles (
    File INTEGER PRIMARY KEY,
    WorkingDirectory INTEGER NOT NULL,
    BuildCommand INTEGER NOT NULL,
    BuildArgs INTEGER NOT NULL,
    LastIndexed INTEGER NOT NULL
);

-- Include graph; rows for an includer are its full transitive closure as of
-- its last parse, Direct marks textual include directives
CREATE TABLE IF NOT EXISTS Inclusions (
    File INTEGER NOT NULL,
    Inclusion INTEGER NOT NULL,
    Direct INTEGER NOT NULL,
    PRIMARY KEY (File, Inclusion)
);

CREATE INDEX IF NOT EXISTS IdxInclusionsInclusion ON Inclusions(Inclusion);

-- Symbol definitions, keyed by USR fingerprint
CREATE TABLE IF NOT EXISTS Definitions (
    USRHash INTEGER PRIMARY KEY,
    Name TEXT NOT NULL,
    USR TEXT NOT NULL,
    File INTEGER NOT NULL,
    Line INTEGER NOT NULL,
    Col INTEGER NOT NULL,
    Kind INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS IdxDefinitionsFile ON Definitions(File);

-- Override / base-method edges
CREATE TABLE IF NOT EXISTS Overrides (
    Definition INTEGER NOT NULL,
    Overridden INTEGER NOT NULL,
    PRIMARY KEY (Definition, Overridden)
);

CREATE INDEX IF NOT EXISTS IdxOverridesOverridden ON Overrides(Overridden);

-- Call edges; multiplicity is not modelled
CREATE TABLE IF NOT EXISTS Callers (
    Caller INTEGER NOT NULL,
    Callee INTEGER NOT NULL,
    PRIMARY KEY (Caller, Callee)
);

CREATE INDEX IF NOT EXISTS IdxCallersCallee ON Callers(Callee);

-- References: a source extent mentioning a USR
CREATE TABLE IF NOT EXISTS Refs (
    File INTEGER NOT NULL,
    Line INTEGER NOT NULL,
    Col INTEGER NOT NULL,
    EndLine INTEGER NOT NULL,
    EndCol INTEGER NOT NULL,
    RefUSR INTEGER NOT NULL,
    PRIMARY KEY (File, Line, Col)
);

CREATE INDEX IF NOT EXISTS IdxRefsUSR ON Refs(RefUSR);
";
