use super::*;
use crate::entity::{EntityKind, EntityRef};
use crate::sql_params;

impl CrmDb {
    // =========================================================================
    // Notes
    // =========================================================================

    /// Attach a note to an entity.
    pub fn insert_note(
        &mut self,
        id: Option<i64>,
        entity: EntityRef,
        text: &str,
    ) -> Result<i64, DbError> {
        let now = now_timestamp();
        match id {
            Some(id) => self.insert_with_id(
                id,
                "INSERT INTO notes (id, entity_type, entity_id, note_text, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                sql_params![id, entity.kind.as_str(), entity.id, text, now],
            ),
            None => self.insert(
                "INSERT INTO notes (entity_type, entity_id, note_text, created_at)
                 VALUES (?, ?, ?, ?)",
                sql_params![entity.kind.as_str(), entity.id, text, now],
            ),
        }
    }

    pub fn get_note(&mut self, id: i64) -> Result<Option<DbNote>, DbError> {
        self.query_one(
            "SELECT id, entity_type, entity_id, note_text, created_at FROM notes WHERE id = ?",
            sql_params![id],
        )?
        .map(|row| Self::map_note_row(&row))
        .transpose()
    }

    pub fn delete_note(&mut self, id: i64) -> Result<bool, DbError> {
        Ok(self.execute("DELETE FROM notes WHERE id = ?", sql_params![id])? > 0)
    }

    /// Notes on an entity, newest first.
    pub fn notes_for(&mut self, entity: EntityRef) -> Result<Vec<DbNote>, DbError> {
        let rows = self.query(
            "SELECT id, entity_type, entity_id, note_text, created_at FROM notes
             WHERE entity_type = ? AND entity_id = ?
             ORDER BY created_at DESC, id DESC",
            sql_params![entity.kind.as_str(), entity.id],
        )?;
        rows.iter().map(Self::map_note_row).collect()
    }

    /// Remove every note on an entity. Returns how many were deleted.
    pub fn delete_notes_for(&mut self, entity: EntityRef) -> Result<usize, DbError> {
        self.execute(
            "DELETE FROM notes WHERE entity_type = ? AND entity_id = ?",
            sql_params![entity.kind.as_str(), entity.id],
        )
    }

    fn map_note_row(row: &Row) -> Result<DbNote, DbError> {
        Ok(DbNote {
            id: row.get("id")?,
            entity_kind: EntityKind::from_str_lossy(&row.get::<String>("entity_type")?),
            entity_id: row.get("entity_id")?,
            note_text: row.get("note_text")?,
            created_at: row.text_or_empty("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_utils::test_database;
    use crate::entity::EntityRef;

    #[test]
    fn test_notes_are_scoped_by_kind_and_newest_first() {
        let database = test_database();
        let mut db = database.session();
        let company = EntityRef::company(1);
        let person = EntityRef::individual(1);

        let first = db.insert_note(None, company, "kickoff call").unwrap();
        let second = db.insert_note(None, company, "sent deck").unwrap();
        db.insert_note(None, person, "likes email").unwrap();

        let notes = db.notes_for(company).unwrap();
        let ids: Vec<i64> = notes.iter().map(|n| n.id).collect();
        assert_eq!(ids, [second, first]);
        assert!(notes.iter().all(|n| n.entity() == company));

        assert_eq!(db.delete_notes_for(company).unwrap(), 2);
        assert!(db.notes_for(company).unwrap().is_empty());
        assert_eq!(db.notes_for(person).unwrap().len(), 1);
    }

    #[test]
    fn test_get_and_delete_note() {
        let database = test_database();
        let mut db = database.session();
        let id = db.insert_note(Some(9), EntityRef::individual(3), "hello").unwrap();
        assert_eq!(id, 9);
        let note = db.get_note(id).unwrap().expect("note");
        assert_eq!(note.entity(), EntityRef::individual(3));
        assert!(db.delete_note(id).unwrap());
        assert!(db.get_note(id).unwrap().is_none());
    }
}
