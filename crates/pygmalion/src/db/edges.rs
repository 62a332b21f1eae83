//! Override and call edges, and their joins against `Definitions`.
//!
//! Edge endpoints are USR fingerprints and may precede the matching
//! definition: an edge learned from one translation unit can point at a
//! symbol defined in a unit indexed later. The lookups below inner-join to
//! `Definitions`, so dangling endpoints simply drop out of the results.

use rusqlite::params;
use tracing::trace;

use super::{row_to_def_info, Store, DEF_INFO_SELECT};
use crate::error::Result;
use crate::hash::fingerprint;
use crate::model::{CallEdge, DefInfo, OverrideInfo};

impl Store {
    /// Upsert an override / base-method edge.
    ///
    /// A single-statement write; SQLite makes it atomic without an explicit
    /// transaction.
    pub fn update_override(&mut self, ov: &OverrideInfo) -> Result<()> {
        trace!(usr = %ov.usr, overridden = %ov.overridden, "updating override edge");
        self.conn()
            .prepare_cached(
                "INSERT OR REPLACE INTO Overrides (Definition, Overridden) VALUES (?1, ?2)",
            )?
            .execute(params![fingerprint(&ov.usr), fingerprint(&ov.overridden)])?;
        Ok(())
    }

    /// Upsert a call edge. `(caller, callee)` pairs are unique, so replaying
    /// the same edge any number of times leaves one row.
    pub fn update_caller(&mut self, edge: &CallEdge) -> Result<()> {
        trace!(caller = %edge.caller, callee = %edge.callee, "updating call edge");
        self.conn()
            .prepare_cached("INSERT OR REPLACE INTO Callers (Caller, Callee) VALUES (?1, ?2)")?
            .execute(params![fingerprint(&edge.caller), fingerprint(&edge.callee)])?;
        Ok(())
    }

    /// Definitions of every symbol that calls `usr`.
    pub fn get_callers(&self, usr: &str) -> Result<Vec<DefInfo>> {
        self.edge_join(
            "JOIN Callers c ON c.Caller = d.USRHash WHERE c.Callee = ?1",
            usr,
        )
    }

    /// Definitions of every symbol that `usr` calls.
    pub fn get_callees(&self, usr: &str) -> Result<Vec<DefInfo>> {
        self.edge_join(
            "JOIN Callers c ON c.Callee = d.USRHash WHERE c.Caller = ?1",
            usr,
        )
    }

    /// Definitions of the symbols `usr` overrides (its bases).
    pub fn get_bases(&self, usr: &str) -> Result<Vec<DefInfo>> {
        self.edge_join(
            "JOIN Overrides o ON o.Overridden = d.USRHash WHERE o.Definition = ?1",
            usr,
        )
    }

    /// Definitions of the symbols that override `usr`.
    pub fn get_overriders(&self, usr: &str) -> Result<Vec<DefInfo>> {
        self.edge_join(
            "JOIN Overrides o ON o.Definition = d.USRHash WHERE o.Overridden = ?1",
            usr,
        )
    }

    /// Shared shape of the four edge lookups: one edge-table join against
    /// the definition select, filtered by the far endpoint.
    fn edge_join(&self, join_and_filter: &str, usr: &str) -> Result<Vec<DefInfo>> {
        let sql = format!("{DEF_INFO_SELECT} {join_and_filter} ORDER BY d.Name");
        let defs = self
            .conn()
            .prepare_cached(&sql)?
            .query_map([fingerprint(usr)], row_to_def_info)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(defs)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::temp_store;
    use super::*;
    use crate::model::{DefInfo, SourceLocation};

    fn def(usr: &str, name: &str) -> DefInfo {
        DefInfo {
            usr: usr.to_string(),
            name: name.to_string(),
            location: SourceLocation {
                file: "f.cpp".to_string(),
                line: 1,
                col: 1,
            },
            kind: "FunctionDecl".to_string(),
        }
    }

    #[test]
    fn call_edges_answer_both_directions() {
        let (_dir, mut store) = temp_store();
        store.update_def(&def("c:@a", "a")).expect("def a");
        store.update_def(&def("c:@b", "b")).expect("def b");
        store
            .update_caller(&CallEdge {
                caller: "c:@a".to_string(),
                callee: "c:@b".to_string(),
            })
            .expect("edge");

        let callees = store.get_callees("c:@a").expect("callees");
        assert_eq!(callees.len(), 1);
        assert_eq!(callees[0].name, "b");

        let callers = store.get_callers("c:@b").expect("callers");
        assert_eq!(callers.len(), 1);
        assert_eq!(callers[0].name, "a");
    }

    #[test]
    fn duplicate_call_edges_collapse() {
        let (_dir, mut store) = temp_store();
        store.update_def(&def("c:@a", "a")).expect("def a");
        store.update_def(&def("c:@b", "b")).expect("def b");
        let edge = CallEdge {
            caller: "c:@a".to_string(),
            callee: "c:@b".to_string(),
        };
        for _ in 0..3 {
            store.update_caller(&edge).expect("edge");
        }

        assert_eq!(store.get_callees("c:@a").expect("callees").len(), 1);
        assert_eq!(store.get_callers("c:@b").expect("callers").len(), 1);
    }

    #[test]
    fn overrides_link_bases_and_overriders() {
        let (_dir, mut store) = temp_store();
        store.update_def(&def("c:@child", "run")).expect("child");
        store.update_def(&def("c:@parent", "run")).expect("parent");
        store
            .update_override(&OverrideInfo {
                usr: "c:@child".to_string(),
                overridden: "c:@parent".to_string(),
            })
            .expect("edge");

        let bases = store.get_bases("c:@child").expect("bases");
        assert_eq!(bases.len(), 1);
        assert_eq!(bases[0].usr, "c:@parent");

        let overriders = store.get_overriders("c:@parent").expect("overriders");
        assert_eq!(overriders.len(), 1);
        assert_eq!(overriders[0].usr, "c:@child");
    }

    #[test]
    fn dangling_endpoints_are_dropped_from_results() {
        let (_dir, mut store) = temp_store();
        store.update_def(&def("c:@a", "a")).expect("def a");
        // callee never defined
        store
            .update_caller(&CallEdge {
                caller: "c:@a".to_string(),
                callee: "c:@ghost".to_string(),
            })
            .expect("edge");

        assert!(store.get_callees("c:@a").expect("callees").is_empty());
        // the edge itself is still queryable from the other side once the
        // definition arrives
        store.update_def(&def("c:@ghost", "ghost")).expect("late def");
        assert_eq!(store.get_callees("c:@a").expect("callees").len(), 1);
    }
}
