//! Row conversion helpers and shared SQL fragments.

use crate::error::{Error, Result};
use crate::model::{CommandInfo, DefInfo, SourceLocation, SourceRange};

/// SELECT list + joins reconstructing a [`CommandInfo`] from a `SourceFiles`
/// row. Callers append their own WHERE clause; the driving table is aliased
/// `sf`.
pub(crate) const COMMAND_INFO_SELECT: &str = "\
    SELECT f.Name, p.Path, bc.Command, ba.Args, sf.LastIndexed
    FROM SourceFiles sf
    JOIN Files f ON f.Hash = sf.File
    JOIN Paths p ON p.Hash = sf.WorkingDirectory
    JOIN BuildCommands bc ON bc.Hash = sf.BuildCommand
    JOIN BuildArgs ba ON ba.Hash = sf.BuildArgs";

/// SELECT list + joins reconstructing a [`DefInfo`] from a `Definitions`
/// row. The driving table is aliased `d`; joining through the dictionaries
/// silently drops rows whose file or kind text is missing.
pub(crate) const DEF_INFO_SELECT: &str = "\
    SELECT d.Name, d.USR, f.Name, d.Line, d.Col, k.Kind
    FROM Definitions d
    JOIN Files f ON f.Hash = d.File
    JOIN Kinds k ON k.Hash = d.Kind";

/// Convert a row shaped by [`COMMAND_INFO_SELECT`].
pub(crate) fn row_to_command_info(row: &rusqlite::Row) -> rusqlite::Result<CommandInfo> {
    let args_text: String = row.get(3)?;
    let args = parse_args(&args_text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(CommandInfo {
        file: row.get(0)?,
        working_dir: row.get(1)?,
        command: row.get(2)?,
        args,
        last_indexed: row.get::<_, i64>(4)? as u64,
    })
}

/// Convert a row shaped by [`DEF_INFO_SELECT`].
pub(crate) fn row_to_def_info(row: &rusqlite::Row) -> rusqlite::Result<DefInfo> {
    Ok(DefInfo {
        name: row.get(0)?,
        usr: row.get(1)?,
        location: SourceLocation {
            file: row.get(2)?,
            line: row.get(3)?,
            col: row.get(4)?,
        },
        kind: row.get(5)?,
    })
}

/// Convert a `(Files.Name, Line, Col, EndLine, EndCol)` row.
pub(crate) fn row_to_source_range(row: &rusqlite::Row) -> rusqlite::Result<SourceRange> {
    Ok(SourceRange {
        file: row.get(0)?,
        line: row.get(1)?,
        col: row.get(2)?,
        end_line: row.get(3)?,
        end_col: row.get(4)?,
    })
}

/// Decode an argument vector from its stored JSON serialization.
fn parse_args(text: &str) -> std::result::Result<Vec<String>, serde_json::Error> {
    serde_json::from_str(text)
}

/// Encode an argument vector to the text stored in `BuildArgs`.
pub(crate) fn serialize_args(args: &[String]) -> Result<String> {
    serde_json::to_string(args)
        .map_err(|e| Error::Internal(format!("argument vector serialization failed: {e}")))
}

/// The normalized directory prefix of a textual path.
///
/// Purely textual: trailing slashes are trimmed, then everything up to the
/// last separator is the directory. A bare filename normalizes to the empty
/// string. No filesystem access, so the result is deterministic for any
/// input.
pub(crate) fn normalized_dir(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[..idx],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_dir_strips_the_filename() {
        assert_eq!(normalized_dir("src/a.cpp"), "src");
        assert_eq!(normalized_dir("/abs/deep/dir/x.hpp"), "/abs/deep/dir");
    }

    #[test]
    fn normalized_dir_ignores_trailing_slashes() {
        assert_eq!(normalized_dir("src/sub/"), "src");
    }

    #[test]
    fn bare_filename_has_empty_dir() {
        assert_eq!(normalized_dir("a.cpp"), "");
    }
}
