//! Include-graph edges and includer lookup.

use rusqlite::params;
use tracing::trace;

use super::commands::intern_file;
use super::{row_to_command_info, Store, COMMAND_INFO_SELECT};
use crate::error::Result;
use crate::hash::fingerprint;
use crate::model::{CommandInfo, Inclusion};

impl Store {
    /// Upsert one include-graph edge.
    ///
    /// The indexer replays the full closure for a translation unit after
    /// `reset_metadata`, so a re-index replaces the includer's edge set
    /// wholesale.
    pub fn update_inclusion(&mut self, inc: &Inclusion) -> Result<()> {
        trace!(includer = %inc.includer, included = %inc.included, "updating inclusion");
        self.with_transaction(|tx| {
            let includer_hash = intern_file(tx, &inc.includer)?;
            let included_hash = intern_file(tx, &inc.included)?;
            tx.prepare_cached(
                "INSERT OR REPLACE INTO Inclusions (File, Inclusion, Direct) VALUES (?1, ?2, ?3)",
            )?
            .execute(params![includer_hash, included_hash, inc.direct])?;
            Ok(())
        })
    }

    /// Build commands of every translation unit that includes `file`.
    ///
    /// Each includer's row set already holds its transitive closure, so a
    /// single-level join reaches all transitive includers; used to find a
    /// command line suitable for compiling a header.
    pub fn get_includers(&self, file: &str) -> Result<Vec<CommandInfo>> {
        let sql = format!(
            "{COMMAND_INFO_SELECT} \
             JOIN Inclusions i ON i.File = sf.File \
             WHERE i.Inclusion = ?1 \
             ORDER BY f.Name"
        );
        let infos = self
            .conn()
            .prepare_cached(&sql)?
            .query_map([fingerprint(file)], row_to_command_info)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::temp_store;
    use crate::model::{CommandInfo, Inclusion};

    #[test]
    fn includers_are_found_through_the_inclusion_graph() {
        let (_dir, mut store) = temp_store();

        store
            .update_source_file(&CommandInfo {
                file: "a.cpp".to_string(),
                working_dir: "/proj".to_string(),
                command: "cc".to_string(),
                args: vec!["-c".to_string(), "a.cpp".to_string()],
                last_indexed: 1,
            })
            .expect("command");
        store
            .update_inclusion(&Inclusion {
                includer: "a.cpp".to_string(),
                included: "h.hpp".to_string(),
                direct: true,
            })
            .expect("inclusion");

        let includers = store.get_includers("h.hpp").expect("query");
        assert_eq!(includers.len(), 1);
        assert_eq!(includers[0].file, "a.cpp");
    }

    #[test]
    fn header_with_no_includers_yields_empty() {
        let (_dir, store) = temp_store();
        assert!(store.get_includers("lonely.hpp").expect("query").is_empty());
    }
}
