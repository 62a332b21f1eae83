//! The fact model: typed records produced by semantic analysis of one
//! translation unit and persisted in the store.
//!
//! These types cross three boundaries (the worker wire protocol, the
//! request channels, and the client RPC), so they are plain owned data with
//! `serde` derives for the JSON edges. The binary wire encoding lives in
//! [`crate::wire`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// A point in a source file. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// A source extent. Both endpoints are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub file: String,
    pub line: u32,
    pub col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl SourceRange {
    /// Whether `loc` lies within this extent.
    ///
    /// Interior lines match unconditionally; boundary lines are bounded by
    /// column, and a single-line range bounds the column on both sides. This
    /// mirrors the SQL predicate used by the reference lookup.
    #[must_use]
    pub fn contains(&self, loc: &SourceLocation) -> bool {
        if loc.file != self.file {
            return false;
        }
        let after_start = loc.line > self.line || (loc.line == self.line && loc.col >= self.col);
        let before_end =
            loc.line < self.end_line || (loc.line == self.end_line && loc.col <= self.end_col);
        after_start && before_end
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}-{}:{}",
            self.file, self.line, self.col, self.end_line, self.end_col
        )
    }
}

/// How a translation unit was compiled: the observed build invocation.
///
/// One per source file; re-observation replaces the previous record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInfo {
    /// Source file the command compiles.
    pub file: String,
    /// Directory the compiler was invoked from.
    pub working_dir: String,
    /// Compiler executable.
    pub command: String,
    /// Arguments, excluding the executable itself.
    pub args: Vec<String>,
    /// Seconds since the epoch at the last (re-)index of this file.
    pub last_indexed: u64,
}

impl CommandInfo {
    /// The full command line, space-joined, as exported to
    /// `compile_commands.json`.
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut line = self.command.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// One edge of the `#include` graph.
///
/// The set of inclusions recorded for an includer is the full transitive
/// closure observed in its last parse; `direct` marks the textually named
/// ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inclusion {
    /// Translation unit whose parse produced this edge.
    pub includer: String,
    /// Header reached during that parse.
    pub included: String,
    /// `true` iff the includer names the header in an include directive.
    pub direct: bool,
}

/// A symbol definition.
///
/// `usr` is the compiler's Unified Symbol Resolution string: opaque, stable
/// for the same entity across translation units. `kind` is the compiler's
/// textual cursor category (`VarDecl`, `FunctionDecl`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefInfo {
    pub usr: String,
    pub name: String,
    pub location: SourceLocation,
    pub kind: String,
}

impl fmt::Display for DefInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.name, self.kind, self.location)
    }
}

/// Directed override edge.
///
/// Doubles as the base-class link: a virtual-method override and a
/// base-method relationship share this edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideInfo {
    /// USR of the defining (overriding) symbol.
    pub usr: String,
    /// USR of the overridden (base) symbol.
    pub overridden: String,
}

/// Directed call edge. Multiplicity is not modelled; presence suffices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller: String,
    pub callee: String,
}

/// A reference: a source extent that mentions the symbol named by `usr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub range: SourceRange,
    pub usr: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(line: u32, col: u32, end_line: u32, end_col: u32) -> SourceRange {
        SourceRange {
            file: "f.cpp".to_string(),
            line,
            col,
            end_line,
            end_col,
        }
    }

    fn at(line: u32, col: u32) -> SourceLocation {
        SourceLocation {
            file: "f.cpp".to_string(),
            line,
            col,
        }
    }

    #[test]
    fn contains_matches_interior_lines_unconditionally() {
        let r = range(2, 10, 5, 3);
        assert!(r.contains(&at(3, 1)));
        assert!(r.contains(&at(4, 999)));
    }

    #[test]
    fn contains_bounds_boundary_lines_by_column() {
        let r = range(2, 10, 5, 3);
        assert!(r.contains(&at(2, 10)));
        assert!(!r.contains(&at(2, 9)));
        assert!(r.contains(&at(5, 3)));
        assert!(!r.contains(&at(5, 4)));
    }

    #[test]
    fn single_line_range_bounds_both_columns() {
        let r = range(1, 18, 1, 20);
        assert!(!r.contains(&at(1, 17)));
        assert!(r.contains(&at(1, 18)));
        assert!(r.contains(&at(1, 20)));
        assert!(!r.contains(&at(1, 21)));
    }

    #[test]
    fn contains_requires_matching_file() {
        let r = range(1, 1, 9, 9);
        let other = SourceLocation {
            file: "g.cpp".to_string(),
            line: 2,
            col: 2,
        };
        assert!(!r.contains(&other));
    }

    #[test]
    fn command_line_is_space_joined() {
        let ci = CommandInfo {
            file: "a.cpp".to_string(),
            working_dir: "/src".to_string(),
            command: "clang++".to_string(),
            args: vec!["-std=c++17".to_string(), "-c".to_string(), "a.cpp".to_string()],
            last_indexed: 0,
        };
        assert_eq!(ci.command_line(), "clang++ -std=c++17 -c a.cpp");
    }
}
