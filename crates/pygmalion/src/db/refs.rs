//! References and range-containment lookup.

use rusqlite::params;
use tracing::trace;

use super::commands::intern_file;
use super::helpers::row_to_source_range;
use super::{row_to_def_info, Store, DEF_INFO_SELECT};
use crate::error::Result;
use crate::hash::fingerprint;
use crate::model::{DefInfo, Reference, SourceLocation, SourceRange};

impl Store {
    /// Upsert a reference row. Keyed by its start position within the file:
    /// one extent starting at a given point names one symbol.
    pub fn update_reference(&mut self, reference: &Reference) -> Result<()> {
        trace!(usr = %reference.usr, range = %reference.range, "updating reference");
        self.with_transaction(|tx| {
            let file_hash = intern_file(tx, &reference.range.file)?;
            tx.prepare_cached(
                "INSERT OR REPLACE INTO Refs \
                 (File, Line, Col, EndLine, EndCol, RefUSR) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?
            .execute(params![
                file_hash,
                reference.range.line,
                reference.range.col,
                reference.range.end_line,
                reference.range.end_col,
                fingerprint(&reference.usr)
            ])?;
            Ok(())
        })
    }

    /// Every extent that references `usr`, the inverse index.
    pub fn get_references(&self, usr: &str) -> Result<Vec<SourceRange>> {
        let ranges = self
            .conn()
            .prepare_cached(
                "SELECT f.Name, r.Line, r.Col, r.EndLine, r.EndCol \
                 FROM Refs r \
                 JOIN Files f ON f.Hash = r.File \
                 WHERE r.RefUSR = ?1 \
                 ORDER BY f.Name, r.Line, r.Col",
            )?
            .query_map([fingerprint(usr)], row_to_source_range)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ranges)
    }

    /// Range-containment lookup: definitions of every symbol whose reference
    /// extent covers `loc`. The mechanism behind parse-free "what is at this
    /// cursor?".
    ///
    /// Containment is: interior lines match unconditionally, boundary lines
    /// are bounded by column, both endpoints inclusive. Written as two
    /// half-plane conjuncts so a single-line extent (`Line = EndLine`)
    /// bounds the column on both sides.
    pub fn get_referenced(&self, loc: &SourceLocation) -> Result<Vec<DefInfo>> {
        let sql = format!(
            "{DEF_INFO_SELECT} \
             JOIN Refs r ON r.RefUSR = d.USRHash \
             WHERE r.File = ?1 \
               AND (?2 > r.Line OR (?2 = r.Line AND ?3 >= r.Col)) \
               AND (?2 < r.EndLine OR (?2 = r.EndLine AND ?3 <= r.EndCol)) \
             ORDER BY r.Line, r.Col"
        );
        let defs = self
            .conn()
            .prepare_cached(&sql)?
            .query_map(
                params![fingerprint(&loc.file), loc.line, loc.col],
                row_to_def_info,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(defs)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::temp_store;
    use super::*;
    use crate::model::DefInfo;

    fn def(usr: &str, name: &str, kind: &str) -> DefInfo {
        DefInfo {
            usr: usr.to_string(),
            name: name.to_string(),
            location: SourceLocation {
                file: "f.cpp".to_string(),
                line: 1,
                col: 5,
            },
            kind: kind.to_string(),
        }
    }

    fn reference(usr: &str, line: u32, col: u32, end_line: u32, end_col: u32) -> Reference {
        Reference {
            range: SourceRange {
                file: "f.cpp".to_string(),
                line,
                col,
                end_line,
                end_col,
            },
            usr: usr.to_string(),
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
    fn cursor_inside_a_reference_finds_the_definition() {
        let (_dir, mut store) = temp_store();
        store.update_def(&def("c:@var", "var", "VarDecl")).expect("def");
        store.update_reference(&reference("c:@var", 1, 18, 1, 20)).expect("ref");

        let hits = store.get_referenced(&at(1, 18)).expect("lookup");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "var");
        assert_eq!(hits[0].kind, "VarDecl");
        assert_eq!(hits[0].location, SourceLocation {
            file: "f.cpp".to_string(),
            line: 1,
            col: 5,
        });
    }

    #[test]
    fn single_line_extent_bounds_both_columns() {
        let (_dir, mut store) = temp_store();
        store.update_def(&def("c:@var", "var", "VarDecl")).expect("def");
        store.update_reference(&reference("c:@var", 1, 18, 1, 20)).expect("ref");

        assert!(store.get_referenced(&at(1, 17)).expect("q").is_empty());
        assert_eq!(store.get_referenced(&at(1, 18)).expect("q").len(), 1);
        assert_eq!(store.get_referenced(&at(1, 20)).expect("q").len(), 1);
        assert!(store.get_referenced(&at(1, 21)).expect("q").is_empty());
    }

    #[test]
    fn interior_lines_match_any_column() {
        let (_dir, mut store) = temp_store();
        store.update_def(&def("c:@m", "m", "CXXMethodDecl")).expect("def");
        store.update_reference(&reference("c:@m", 2, 30, 6, 2)).expect("ref");

        assert_eq!(store.get_referenced(&at(4, 1)).expect("q").len(), 1);
        assert_eq!(store.get_referenced(&at(3, 999)).expect("q").len(), 1);
        // boundary lines bound by column
        assert!(store.get_referenced(&at(2, 29)).expect("q").is_empty());
        assert_eq!(store.get_referenced(&at(2, 30)).expect("q").len(), 1);
        assert_eq!(store.get_referenced(&at(6, 2)).expect("q").len(), 1);
        assert!(store.get_referenced(&at(6, 3)).expect("q").is_empty());
    }

    #[test]
    fn lookup_is_scoped_to_the_file() {
        let (_dir, mut store) = temp_store();
        store.update_def(&def("c:@var", "var", "VarDecl")).expect("def");
        store.update_reference(&reference("c:@var", 1, 1, 1, 3)).expect("ref");

        let elsewhere = SourceLocation {
            file: "g.cpp".to_string(),
            line: 1,
            col: 2,
        };
        assert!(store.get_referenced(&elsewhere).expect("q").is_empty());
    }

    #[test]
    fn references_inverse_index_lists_extents_in_order() {
        let (_dir, mut store) = temp_store();
        store.update_def(&def("c:@var", "var", "VarDecl")).expect("def");
        store.update_reference(&reference("c:@var", 9, 1, 9, 3)).expect("ref");
        store.update_reference(&reference("c:@var", 2, 4, 2, 6)).expect("ref");

        let ranges = store.get_references("c:@var").expect("q");
        assert_eq!(ranges.len(), 2);
        assert_eq!((ranges[0].line, ranges[1].line), (2, 9));
    }

    #[test]
    fn reference_without_definition_yields_nothing_at_cursor() {
        let (_dir, mut store) = temp_store();
        store.update_reference(&reference("c:@ghost", 1, 1, 1, 5)).expect("ref");
        assert!(store.get_referenced(&at(1, 2)).expect("q").is_empty());
    }
}
