use super::*;
use crate::entity::{EntityKind, EntityRef};
use crate::sql_params;

impl CrmDb {
    // =========================================================================
    // Relationships
    // =========================================================================

    /// Record an edge between two entities. Duplicates and self-edges are
    /// stored as given.
    pub fn insert_relationship(
        &mut self,
        id: Option<i64>,
        from: EntityRef,
        to: EntityRef,
        relationship_type: &str,
    ) -> Result<i64, DbError> {
        let now = now_timestamp();
        match id {
            Some(id) => self.insert_with_id(
                id,
                "INSERT INTO relationships
                    (id, from_type, from_id, to_type, to_id, relationship_type, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                sql_params![
                    id,
                    from.kind.as_str(),
                    from.id,
                    to.kind.as_str(),
                    to.id,
                    relationship_type,
                    now,
                ],
            ),
            None => self.insert(
                "INSERT INTO relationships
                    (from_type, from_id, to_type, to_id, relationship_type, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                sql_params![
                    from.kind.as_str(),
                    from.id,
                    to.kind.as_str(),
                    to.id,
                    relationship_type,
                    now,
                ],
            ),
        }
    }

    pub fn get_relationship(&mut self, id: i64) -> Result<Option<DbRelationship>, DbError> {
        self.query_one(
            "SELECT id, from_type, from_id, to_type, to_id, relationship_type, created_at
             FROM relationships WHERE id = ?",
            sql_params![id],
        )?
        .map(|row| Self::map_relationship_row(&row))
        .transpose()
    }

    pub fn delete_relationship(&mut self, id: i64) -> Result<bool, DbError> {
        Ok(self.execute("DELETE FROM relationships WHERE id = ?", sql_params![id])? > 0)
    }

    /// Every edge touching `entity` on either end, oldest first.
    pub fn relationships_for(&mut self, entity: EntityRef) -> Result<Vec<DbRelationship>, DbError> {
        let kind = entity.kind.as_str();
        let rows = self.query(
            "SELECT id, from_type, from_id, to_type, to_id, relationship_type, created_at
             FROM relationships
             WHERE (from_type = ? AND from_id = ?) OR (to_type = ? AND to_id = ?)
             ORDER BY id",
            sql_params![kind, entity.id, kind, entity.id],
        )?;
        rows.iter().map(Self::map_relationship_row).collect()
    }

    /// Drop every edge touching `entity`. Returns how many were deleted.
    pub fn delete_relationships_for(&mut self, entity: EntityRef) -> Result<usize, DbError> {
        let kind = entity.kind.as_str();
        self.execute(
            "DELETE FROM relationships
             WHERE (from_type = ? AND from_id = ?) OR (to_type = ? AND to_id = ?)",
            sql_params![kind, entity.id, kind, entity.id],
        )
    }

    fn map_relationship_row(row: &Row) -> Result<DbRelationship, DbError> {
        Ok(DbRelationship {
            id: row.get("id")?,
            from_kind: EntityKind::from_str_lossy(&row.get::<String>("from_type")?),
            from_id: row.get("from_id")?,
            to_kind: EntityKind::from_str_lossy(&row.get::<String>("to_type")?),
            to_id: row.get("to_id")?,
            relationship_type: row.text_or_empty("relationship_type")?,
            created_at: row.text_or_empty("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_utils::test_database;
    use crate::entity::EntityRef;

    #[test]
    fn test_relationships_found_from_either_end() {
        let database = test_database();
        let mut db = database.session();
        let acme = EntityRef::company(1);
        let ada = EntityRef::individual(1);
        let grace = EntityRef::individual(2);

        let a = db.insert_relationship(None, acme, ada, "employee").unwrap();
        let b = db.insert_relationship(None, grace, acme, "advisor").unwrap();
        db.insert_relationship(None, ada, grace, "friend").unwrap();

        let ids: Vec<i64> = db.relationships_for(acme).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, [a, b]);

        // Company 1 and individual 1 share an id but are different entities.
        assert_eq!(db.relationships_for(ada).unwrap().len(), 2);

        assert_eq!(db.delete_relationships_for(acme).unwrap(), 2);
        assert!(db.relationships_for(acme).unwrap().is_empty());
        assert_eq!(db.relationships_for(grace).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_edges_are_kept() {
        let database = test_database();
        let mut db = database.session();
        let acme = EntityRef::company(1);
        let ada = EntityRef::individual(4);
        db.insert_relationship(None, acme, ada, "employee").unwrap();
        let dup = db.insert_relationship(None, acme, ada, "employee").unwrap();
        assert_eq!(db.relationships_for(ada).unwrap().len(), 2);

        let rel = db.get_relationship(dup).unwrap().expect("edge");
        assert_eq!(rel.other_end(ada), acme);
        assert!(db.delete_relationship(dup).unwrap());
        assert_eq!(db.relationships_for(ada).unwrap().len(), 1);
    }
}
