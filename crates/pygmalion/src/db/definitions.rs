//! Symbol definitions and per-translation-unit metadata reset.

use rusqlite::{params, OptionalExtension};
use tracing::trace;

use super::commands::intern_file;
use super::{row_to_def_info, Store, DEF_INFO_SELECT};
use crate::error::Result;
use crate::hash::fingerprint;
use crate::model::DefInfo;

impl Store {
    /// Upsert a symbol definition, keyed by its USR fingerprint.
    pub fn update_def(&mut self, def: &DefInfo) -> Result<()> {
        trace!(usr = %def.usr, name = %def.name, "updating definition");
        self.with_transaction(|tx| {
            let file_hash = intern_file(tx, &def.location.file)?;

            let kind_hash = fingerprint(&def.kind);
            tx.prepare_cached("INSERT OR IGNORE INTO Kinds (Hash, Kind) VALUES (?1, ?2)")?
                .execute(params![kind_hash, def.kind])?;

            tx.prepare_cached(
                "INSERT OR REPLACE INTO Definitions \
                 (USRHash, Name, USR, File, Line, Col, Kind) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?
            .execute(params![
                fingerprint(&def.usr),
                def.name,
                def.usr,
                file_hash,
                def.location.line,
                def.location.col,
                kind_hash
            ])?;
            Ok(())
        })
    }

    /// Look up a definition by USR.
    pub fn get_definition(&self, usr: &str) -> Result<Option<DefInfo>> {
        let sql = format!("{DEF_INFO_SELECT} WHERE d.USRHash = ?1");
        self.conn()
            .prepare_cached(&sql)?
            .query_row([fingerprint(usr)], row_to_def_info)
            .optional()
            .map_err(Into::into)
    }

    /// Drop the facts derived from the last parse of `file`: its inclusions,
    /// the references it contains, and the definitions sited in it.
    ///
    /// Called once per translation unit before replaying its fresh facts.
    /// Override and call edges are not file-keyed and survive; they are
    /// idempotent under replay.
    pub fn reset_metadata(&mut self, file: &str) -> Result<()> {
        trace!(file = %file, "resetting translation unit metadata");
        let hash = fingerprint(file);
        self.with_transaction(|tx| {
            tx.prepare_cached("DELETE FROM Inclusions WHERE File = ?1")?
                .execute([hash])?;
            tx.prepare_cached("DELETE FROM Refs WHERE File = ?1")?
                .execute([hash])?;
            tx.prepare_cached("DELETE FROM Definitions WHERE File = ?1")?
                .execute([hash])?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::temp_store;
    use crate::model::{DefInfo, SourceLocation};

    fn def(usr: &str, name: &str, file: &str, line: u32, col: u32, kind: &str) -> DefInfo {
        DefInfo {
            usr: usr.to_string(),
            name: name.to_string(),
            location: SourceLocation {
                file: file.to_string(),
                line,
                col,
            },
            kind: kind.to_string(),
        }
    }

    #[test]
    fn definition_roundtrips_byte_identically() {
        let (_dir, mut store) = temp_store();
        let d = def("c:@var", "var", "f.cpp", 1, 5, "VarDecl");
        store.update_def(&d).expect("update");

        let found = store.get_definition("c:@var").expect("query").expect("exists");
        assert_eq!(found, d);
    }

    #[test]
    fn repeated_update_leaves_one_row() {
        let (_dir, mut store) = temp_store();
        let d = def("c:@F@main#", "main", "f.cpp", 1, 14, "FunctionDecl");
        store.update_def(&d).expect("first");
        store.update_def(&d).expect("second");

        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM Definitions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn redefinition_moves_the_location() {
        let (_dir, mut store) = temp_store();
        store
            .update_def(&def("c:@f", "f", "old.cpp", 3, 1, "FunctionDecl"))
            .expect("first");
        store
            .update_def(&def("c:@f", "f", "new.cpp", 7, 1, "FunctionDecl"))
            .expect("second");

        let found = store.get_definition("c:@f").unwrap().unwrap();
        assert_eq!(found.location.file, "new.cpp");
        assert_eq!(found.location.line, 7);
    }

    #[test]
    fn reset_metadata_drops_only_this_files_definitions() {
        let (_dir, mut store) = temp_store();
        store
            .update_def(&def("c:@a", "a", "t.cpp", 1, 1, "FunctionDecl"))
            .expect("a");
        store
            .update_def(&def("c:@b", "b", "other.cpp", 1, 1, "FunctionDecl"))
            .expect("b");

        store.reset_metadata("t.cpp").expect("reset");

        assert!(store.get_definition("c:@a").unwrap().is_none());
        assert!(store.get_definition("c:@b").unwrap().is_some());
    }

    #[test]
    fn missing_usr_is_none_not_an_error() {
        let (_dir, store) = temp_store();
        assert!(store.get_definition("c:@nope").expect("query").is_none());
    }
}
