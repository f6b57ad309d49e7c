// Manual ordering: persist a client-submitted order for one of the reorderable lists.

use serde::{Deserialize, Serialize};

use crate::db::CrmDb;
use crate::error::CrmError;
use crate::sql_params;

/// Lists that can be reordered by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReorderTarget {
    Companies,
    Individuals,
    FollowUps,
    PriorityFollowUps,
    WatchFollowUps,
    Proposals,
}

impl ReorderTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReorderTarget::Companies => "companies",
            ReorderTarget::Individuals => "individuals",
            ReorderTarget::FollowUps => "follow_ups",
            ReorderTarget::PriorityFollowUps => "priority_follow_ups",
            ReorderTarget::WatchFollowUps => "watch_follow_ups",
            ReorderTarget::Proposals => "proposals",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "companies" => Some(ReorderTarget::Companies),
            "individuals" => Some(ReorderTarget::Individuals),
            "follow_ups" => Some(ReorderTarget::FollowUps),
            "priority_follow_ups" => Some(ReorderTarget::PriorityFollowUps),
            "watch_follow_ups" => Some(ReorderTarget::WatchFollowUps),
            "proposals" => Some(ReorderTarget::Proposals),
            _ => None,
        }
    }

    /// The one statement that writes a position for this list. Priority
    /// tiers keep their own order in `priority_order`.
    fn statement(&self) -> &'static str {
        match self {
            ReorderTarget::Companies => "UPDATE companies SET sort_order = ? WHERE id = ?",
            ReorderTarget::Individuals => "UPDATE individuals SET sort_order = ? WHERE id = ?",
            ReorderTarget::FollowUps => "UPDATE follow_ups SET sort_order = ? WHERE id = ?",
            ReorderTarget::PriorityFollowUps | ReorderTarget::WatchFollowUps => {
                "UPDATE follow_ups SET priority_order = ? WHERE id = ?"
            }
            ReorderTarget::Proposals => "UPDATE proposals SET sort_order = ? WHERE id = ?",
        }
    }
}

/// Give each id its position in `ids` (0, 1, 2, ...). Rows not listed keep
/// their current position. Returns the number of rows updated.
pub fn reorder(db: &mut CrmDb, target: ReorderTarget, ids: &[i64]) -> Result<usize, CrmError> {
    let sql = target.statement();
    let mut updated = 0;
    for (position, id) in ids.iter().enumerate() {
        updated += db.execute(sql, sql_params![position, *id])?;
    }
    log::info!(
        "Reordered {} ({} of {} ids matched)",
        target.as_str(),
        updated,
        ids.len()
    );
    Ok(updated)
}

/// `reorder` for a target named by the client. Unknown names are rejected
/// before anything is written.
pub fn reorder_named(db: &mut CrmDb, target: &str, ids: &[i64]) -> Result<usize, CrmError> {
    let target =
        ReorderTarget::parse(target).ok_or_else(|| CrmError::validation("Invalid type"))?;
    reorder(db, target, ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_database;
    use crate::db::ProposalFields;
    use crate::entity::CompanyFields;

    fn sort_orders(db: &mut CrmDb, table_sql: &str) -> Vec<(i64, i64)> {
        db.query(table_sql, &[])
            .unwrap()
            .iter()
            .map(|r| (r.get("id").unwrap(), r.get("ord").unwrap()))
            .collect()
    }

    #[test]
    fn test_reorder_rewrites_positions_of_listed_ids_only() {
        let database = test_database();
        let mut db = database.session();
        let mut ids = Vec::new();
        for name in ["A", "B", "C", "D"] {
            let fields = CompanyFields {
                name: name.into(),
                ..Default::default()
            };
            ids.push(db.insert_company(None, &fields).unwrap());
        }
        let (id1, id2, id3, id4) = (ids[0], ids[1], ids[2], ids[3]);
        db.execute(
            "UPDATE companies SET sort_order = 9 WHERE id = ?",
            sql_params![id4],
        )
        .unwrap();

        let n = reorder(&mut db, ReorderTarget::Companies, &[id3, id1, id2]).unwrap();
        assert_eq!(n, 3);
        let orders = sort_orders(
            &mut db,
            "SELECT id, sort_order AS ord FROM companies ORDER BY id",
        );
        assert_eq!(orders, [(id1, 1), (id2, 2), (id3, 0), (id4, 9)]);
    }

    #[test]
    fn test_priority_lists_write_priority_order() {
        let database = test_database();
        let mut db = database.session();
        let a = db.insert_follow_up(None, "A", "", "TBD").unwrap();
        let b = db.insert_follow_up(None, "B", "", "TBD").unwrap();

        reorder_named(&mut db, "watch_follow_ups", &[b, a]).unwrap();
        let rows = sort_orders(
            &mut db,
            "SELECT id, priority_order AS ord FROM follow_ups ORDER BY id",
        );
        assert_eq!(rows, [(a, 1), (b, 0)]);
        let rows = sort_orders(&mut db, "SELECT id, sort_order AS ord FROM follow_ups ORDER BY id");
        assert_eq!(rows, [(a, 0), (b, 0)]);

        reorder_named(&mut db, "follow_ups", &[b, a]).unwrap();
        let rows = sort_orders(&mut db, "SELECT id, sort_order AS ord FROM follow_ups ORDER BY id");
        assert_eq!(rows, [(a, 1), (b, 0)]);
    }

    #[test]
    fn test_unknown_target_rejected_before_write() {
        let database = test_database();
        let mut db = database.session();
        let p = db
            .insert_proposal(
                None,
                &ProposalFields {
                    name: "P".into(),
                    ..Default::default()
                },
            )
            .unwrap();

        let err = reorder_named(&mut db, "proposals; DROP TABLE proposals", &[p]).unwrap_err();
        assert!(err.is_validation());
        assert!(reorder_named(&mut db, "notes", &[p]).unwrap_err().is_validation());

        reorder_named(&mut db, "proposals", &[p]).unwrap();
        assert_eq!(ReorderTarget::parse("individuals"), Some(ReorderTarget::Individuals));
    }
}
