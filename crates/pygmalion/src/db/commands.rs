//! Build-command observations: the `SourceFiles` fact table and its
//! dictionary tables.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::trace;

use super::helpers::serialize_args;
use super::{normalized_dir, row_to_command_info, Store, COMMAND_INFO_SELECT};
use crate::error::Result;
use crate::hash::{fingerprint, fingerprint_args};
use crate::model::CommandInfo;

/// Insert a path into the `Files` dictionary if it is not already there.
pub(crate) fn intern_file(conn: &Connection, file: &str) -> Result<i64> {
    let hash = fingerprint(file);
    conn.prepare_cached("INSERT OR IGNORE INTO Files (Hash, Name) VALUES (?1, ?2)")?
        .execute(params![hash, file])?;
    Ok(hash)
}

impl Store {
    /// Record (or replace) the observed build invocation for a source file.
    ///
    /// Atomic across the five inserts: the dictionary entries for the path,
    /// working directory, command, and argument vector, then the
    /// `SourceFiles` upsert.
    pub fn update_source_file(&mut self, ci: &CommandInfo) -> Result<()> {
        trace!(file = %ci.file, "updating source file command");
        let args_text = serialize_args(&ci.args)?;
        self.with_transaction(|tx| {
            let file_hash = intern_file(tx, &ci.file)?;

            let dir_hash = fingerprint(&ci.working_dir);
            tx.prepare_cached("INSERT OR IGNORE INTO Paths (Hash, Path) VALUES (?1, ?2)")?
                .execute(params![dir_hash, ci.working_dir])?;

            let command_hash = fingerprint(&ci.command);
            tx.prepare_cached(
                "INSERT OR IGNORE INTO BuildCommands (Hash, Command) VALUES (?1, ?2)",
            )?
            .execute(params![command_hash, ci.command])?;

            let args_hash = fingerprint_args(&ci.args);
            tx.prepare_cached("INSERT OR IGNORE INTO BuildArgs (Hash, Args) VALUES (?1, ?2)")?
                .execute(params![args_hash, args_text])?;

            tx.prepare_cached(
                "INSERT OR REPLACE INTO SourceFiles \
                 (File, WorkingDirectory, BuildCommand, BuildArgs, LastIndexed) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?
            .execute(params![
                file_hash,
                dir_hash,
                command_hash,
                args_hash,
                ci.last_indexed as i64
            ])?;
            Ok(())
        })
    }

    /// Record a file path, reporting whether it was previously unknown.
    ///
    /// The atomic "did I already know this file?" primitive used to dedupe
    /// worker dispatch: returns `true` iff this call inserted the path.
    pub fn insert_file_and_check(&mut self, file: &str) -> Result<bool> {
        let changed = self
            .conn()
            .prepare_cached("INSERT OR IGNORE INTO Files (Hash, Name) VALUES (?1, ?2)")?
            .execute(params![fingerprint(file), file])?;
        Ok(changed > 0)
    }

    /// Exact-file command lookup.
    pub fn get_command_info(&self, file: &str) -> Result<Option<CommandInfo>> {
        let sql = format!("{COMMAND_INFO_SELECT} WHERE sf.File = ?1");
        self.conn()
            .prepare_cached(&sql)?
            .query_row([fingerprint(file)], row_to_command_info)
            .optional()
            .map_err(Into::into)
    }

    /// Best-effort command lookup for a file that has never been observed.
    ///
    /// Returns a command recorded for any file under the queried file's
    /// normalized directory prefix, with the `file` field rewritten to the
    /// queried path. The match is arbitrary (first row in path order); a
    /// miss is `None`, never an error.
    pub fn get_similar_command_info(&self, file: &str) -> Result<Option<CommandInfo>> {
        let dir = normalized_dir(file);
        if dir.is_empty() {
            return Ok(None);
        }
        let prefix = format!("{dir}/");

        // Prefix compare via substr to sidestep LIKE wildcard escaping.
        let sql = format!(
            "{COMMAND_INFO_SELECT} \
             WHERE substr(f.Name, 1, length(?1)) = ?1 AND sf.File <> ?2 \
             ORDER BY f.Name LIMIT 1"
        );
        let found = self
            .conn()
            .prepare_cached(&sql)?
            .query_row(params![prefix, fingerprint(file)], row_to_command_info)
            .optional()?;

        Ok(found.map(|mut ci| {
            ci.file = file.to_string();
            ci
        }))
    }

    /// Every recorded build invocation, in path order.
    ///
    /// Backs the `compile_commands.json` export: one entry per `SourceFiles`
    /// row.
    pub fn all_command_infos(&self) -> Result<Vec<CommandInfo>> {
        let sql = format!("{COMMAND_INFO_SELECT} ORDER BY f.Name");
        let infos = self
            .conn()
            .prepare_cached(&sql)?
            .query_map([], row_to_command_info)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::temp_store;
    use crate::model::CommandInfo;

    fn command(file: &str) -> CommandInfo {
        CommandInfo {
            file: file.to_string(),
            working_dir: "/proj".to_string(),
            command: "clang++".to_string(),
            args: vec!["-c".to_string(), file.to_string()],
            last_indexed: 42,
        }
    }

    #[test]
    fn command_roundtrips_through_the_dictionaries() {
        let (_dir, mut store) = temp_store();
        let ci = command("src/a.cpp");
        store.update_source_file(&ci).expect("update");

        let found = store
            .get_command_info("src/a.cpp")
            .expect("query")
            .expect("should exist");
        assert_eq!(found, ci);
    }

    #[test]
    fn reobservation_replaces_the_command() {
        let (_dir, mut store) = temp_store();
        store.update_source_file(&command("src/a.cpp")).expect("first");

        let mut newer = command("src/a.cpp");
        newer.args = vec!["-O2".to_string()];
        newer.last_indexed = 99;
        store.update_source_file(&newer).expect("second");

        let found = store.get_command_info("src/a.cpp").unwrap().unwrap();
        assert_eq!(found.args, vec!["-O2".to_string()]);
        assert_eq!(found.last_indexed, 99);
    }

    #[test]
    fn similar_command_rewrites_the_file_field() {
        let (_dir, mut store) = temp_store();
        store.update_source_file(&command("src/a.cpp")).expect("update");

        let similar = store
            .get_similar_command_info("src/b.cpp")
            .expect("query")
            .expect("sibling should match");
        assert_eq!(similar.file, "src/b.cpp");
        assert_eq!(similar.command, "clang++");
        assert_eq!(similar.args, vec!["-c".to_string(), "src/a.cpp".to_string()]);
    }

    #[test]
    fn similar_command_miss_is_none() {
        let (_dir, mut store) = temp_store();
        store.update_source_file(&command("src/a.cpp")).expect("update");

        assert!(store
            .get_similar_command_info("other/b.cpp")
            .expect("query")
            .is_none());
    }

    #[test]
    fn insert_file_and_check_reports_first_insertion_only() {
        let (_dir, mut store) = temp_store();
        assert!(store.insert_file_and_check("h.hpp").expect("first"));
        assert!(!store.insert_file_and_check("h.hpp").expect("second"));
    }
}
