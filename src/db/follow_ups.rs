use super::*;
use crate::entity::{EntityKind, EntityRef};
use crate::sql_params;
use crate::types::like_pattern;

impl CrmDb {
    // =========================================================================
    // Follow-ups (opportunities)
    // =========================================================================

    /// Insert an opportunity. New rows start open at priority 0.
    pub fn insert_follow_up(
        &mut self,
        id: Option<i64>,
        title: &str,
        body: &str,
        opp_type: &str,
    ) -> Result<i64, DbError> {
        let now = now_timestamp();
        match id {
            Some(id) => self.insert_with_id(
                id,
                "INSERT INTO follow_ups (id, title, body, opp_type, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                sql_params![id, title, body, opp_type, now],
            ),
            None => self.insert(
                "INSERT INTO follow_ups (title, body, opp_type, created_at) VALUES (?, ?, ?, ?)",
                sql_params![title, body, opp_type, now],
            ),
        }
    }

    pub fn get_follow_up(&mut self, id: i64) -> Result<Option<DbFollowUp>, DbError> {
        self.query_one(
            "SELECT id, title, body, opp_type, priority_level, priority_order, sort_order,
                    closed_at, created_at
             FROM follow_ups WHERE id = ?",
            sql_params![id],
        )?
        .map(|row| Self::map_follow_up_row(&row))
        .transpose()
    }

    /// Overwrite title, body and type. Returns false if no such row.
    pub fn update_follow_up(
        &mut self,
        id: i64,
        title: &str,
        body: &str,
        opp_type: &str,
    ) -> Result<bool, DbError> {
        let changed = self.execute(
            "UPDATE follow_ups SET title = ?, body = ?, opp_type = ? WHERE id = ?",
            sql_params![title, body, opp_type, id],
        )?;
        Ok(changed > 0)
    }

    pub fn update_follow_up_body(&mut self, id: i64, body: &str) -> Result<bool, DbError> {
        let changed = self.execute(
            "UPDATE follow_ups SET body = ? WHERE id = ?",
            sql_params![body, id],
        )?;
        Ok(changed > 0)
    }

    pub fn set_follow_up_priority(
        &mut self,
        id: i64,
        level: PriorityLevel,
    ) -> Result<bool, DbError> {
        let changed = self.execute(
            "UPDATE follow_ups SET priority_level = ? WHERE id = ?",
            sql_params![level.level(), id],
        )?;
        Ok(changed > 0)
    }

    /// Set or clear `closed_at` unconditionally.
    pub fn set_follow_up_closed_at(
        &mut self,
        id: i64,
        closed_at: Option<&str>,
    ) -> Result<bool, DbError> {
        let changed = self.execute(
            "UPDATE follow_ups SET closed_at = ? WHERE id = ?",
            sql_params![closed_at, id],
        )?;
        Ok(changed > 0)
    }

    /// Stamp `closed_at` only if the opportunity is still open.
    ///
    /// Returns true if a row changed; an already-closed opportunity keeps
    /// its original timestamp.
    pub fn close_follow_up_if_open(&mut self, id: i64) -> Result<bool, DbError> {
        let changed = self.execute(
            "UPDATE follow_ups SET closed_at = ? WHERE id = ? AND closed_at IS NULL",
            sql_params![now_timestamp(), id],
        )?;
        Ok(changed > 0)
    }

    /// Delete the opportunity row only.
    pub fn delete_follow_up(&mut self, id: i64) -> Result<bool, DbError> {
        Ok(self.execute("DELETE FROM follow_ups WHERE id = ?", sql_params![id])? > 0)
    }

    /// Open opportunities, manual order first, then newest.
    pub fn open_follow_ups(&mut self, filter: Option<&str>) -> Result<Vec<DbFollowUp>, DbError> {
        let rows = match filter.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let pattern = like_pattern(q);
                let contains = self.contains_op();
                let sql = [
                    "SELECT id, title, body, opp_type, priority_level, priority_order, sort_order,
                            closed_at, created_at
                     FROM follow_ups
                     WHERE closed_at IS NULL
                       AND (title",
                    contains,
                    " OR COALESCE(body, '')",
                    contains,
                    ")
                     ORDER BY sort_order, created_at DESC, id DESC",
                ]
                .concat();
                self.query(&sql, sql_params![&pattern, &pattern])?
            }
            None => self.query(
                "SELECT id, title, body, opp_type, priority_level, priority_order, sort_order,
                        closed_at, created_at
                 FROM follow_ups
                 WHERE closed_at IS NULL
                 ORDER BY sort_order, created_at DESC, id DESC",
                &[],
            )?,
        };
        rows.iter().map(Self::map_follow_up_row).collect()
    }

    /// Open opportunities in one priority tier, in tier order.
    pub fn follow_ups_in_tier(&mut self, level: PriorityLevel) -> Result<Vec<DbFollowUp>, DbError> {
        let rows = self.query(
            "SELECT id, title, body, opp_type, priority_level, priority_order, sort_order,
                    closed_at, created_at
             FROM follow_ups
             WHERE closed_at IS NULL AND priority_level = ?
             ORDER BY priority_order, created_at DESC, id DESC",
            sql_params![level.level()],
        )?;
        rows.iter().map(Self::map_follow_up_row).collect()
    }

    /// Closed opportunities, most recently closed first.
    pub fn closed_follow_ups(&mut self, filter: Option<&str>) -> Result<Vec<DbFollowUp>, DbError> {
        let rows = match filter.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let pattern = like_pattern(q);
                let contains = self.contains_op();
                let sql = [
                    "SELECT id, title, body, opp_type, priority_level, priority_order, sort_order,
                            closed_at, created_at
                     FROM follow_ups
                     WHERE closed_at IS NOT NULL
                       AND (title",
                    contains,
                    " OR COALESCE(body, '')",
                    contains,
                    ")
                     ORDER BY closed_at DESC, id DESC",
                ]
                .concat();
                self.query(&sql, sql_params![&pattern, &pattern])?
            }
            None => self.query(
                "SELECT id, title, body, opp_type, priority_level, priority_order, sort_order,
                        closed_at, created_at
                 FROM follow_ups
                 WHERE closed_at IS NOT NULL
                 ORDER BY closed_at DESC, id DESC",
                &[],
            )?,
        };
        rows.iter().map(Self::map_follow_up_row).collect()
    }

    /// Opportunities linked to an entity, in link order, each listed once.
    pub fn follow_ups_linked_to(&mut self, entity: EntityRef) -> Result<Vec<DbFollowUp>, DbError> {
        let rows = self.query(
            "SELECT f.id AS id, f.title AS title, f.body AS body, f.opp_type AS opp_type,
                    f.priority_level AS priority_level, f.priority_order AS priority_order,
                    f.sort_order AS sort_order, f.closed_at AS closed_at,
                    f.created_at AS created_at
             FROM follow_up_links l
             JOIN follow_ups f ON f.id = l.follow_up_id
             WHERE l.entity_type = ? AND l.entity_id = ?
             ORDER BY l.id",
            sql_params![entity.kind.as_str(), entity.id],
        )?;
        let mut out: Vec<DbFollowUp> = Vec::with_capacity(rows.len());
        for row in &rows {
            let fu = Self::map_follow_up_row(row)?;
            if !out.iter().any(|seen| seen.id == fu.id) {
                out.push(fu);
            }
        }
        Ok(out)
    }

    /// `(id, title)` of every opportunity, for the proposal form.
    pub fn follow_up_refs(&mut self) -> Result<Vec<NamedRef>, DbError> {
        let sql = [
            "SELECT id, title AS name FROM follow_ups ORDER BY title",
            self.text_collation(),
            ", id",
        ]
        .concat();
        let rows = self.query(&sql, &[])?;
        rows.iter().map(Self::map_named_ref).collect()
    }

    fn map_follow_up_row(row: &Row) -> Result<DbFollowUp, DbError> {
        let opp_type = row.text_or_empty("opp_type")?;
        Ok(DbFollowUp {
            id: row.get("id")?,
            title: row.get("title")?,
            body: row.text_or_empty("body")?,
            opp_type: if opp_type.is_empty() {
                DEFAULT_OPP_TYPE.to_string()
            } else {
                opp_type
            },
            priority_level: PriorityLevel::from_stored(
                row.get::<Option<i64>>("priority_level")?.unwrap_or(0),
            ),
            priority_order: row.get::<Option<i64>>("priority_order")?.unwrap_or(0),
            sort_order: row.get::<Option<i64>>("sort_order")?.unwrap_or(0),
            closed_at: row.get("closed_at")?,
            created_at: row.text_or_empty("created_at")?,
        })
    }

    // =========================================================================
    // Follow-up links
    // =========================================================================

    pub fn insert_follow_up_link(
        &mut self,
        id: Option<i64>,
        follow_up_id: i64,
        entity: EntityRef,
    ) -> Result<i64, DbError> {
        match id {
            Some(id) => self.insert_with_id(
                id,
                "INSERT INTO follow_up_links (id, follow_up_id, entity_type, entity_id)
                 VALUES (?, ?, ?, ?)",
                sql_params![id, follow_up_id, entity.kind.as_str(), entity.id],
            ),
            None => self.insert(
                "INSERT INTO follow_up_links (follow_up_id, entity_type, entity_id) VALUES (?, ?, ?)",
                sql_params![follow_up_id, entity.kind.as_str(), entity.id],
            ),
        }
    }

    /// Links of one opportunity, in insertion order.
    pub fn follow_up_links(&mut self, follow_up_id: i64) -> Result<Vec<DbFollowUpLink>, DbError> {
        let rows = self.query(
            "SELECT id, follow_up_id, entity_type, entity_id FROM follow_up_links
             WHERE follow_up_id = ? ORDER BY id",
            sql_params![follow_up_id],
        )?;
        rows.iter()
            .map(|row| {
                Ok(DbFollowUpLink {
                    id: row.get("id")?,
                    follow_up_id: row.get("follow_up_id")?,
                    entity_kind: EntityKind::from_str_lossy(&row.get::<String>("entity_type")?),
                    entity_id: row.get("entity_id")?,
                })
            })
            .collect()
    }

    pub fn delete_follow_up_links(&mut self, follow_up_id: i64) -> Result<usize, DbError> {
        self.execute(
            "DELETE FROM follow_up_links WHERE follow_up_id = ?",
            sql_params![follow_up_id],
        )
    }

    // =========================================================================
    // Follow-up comments
    // =========================================================================

    pub fn insert_follow_up_comment(
        &mut self,
        id: Option<i64>,
        follow_up_id: i64,
        text: &str,
    ) -> Result<i64, DbError> {
        let now = now_timestamp();
        match id {
            Some(id) => self.insert_with_id(
                id,
                "INSERT INTO follow_up_comments (id, follow_up_id, comment_text, created_at)
                 VALUES (?, ?, ?, ?)",
                sql_params![id, follow_up_id, text, now],
            ),
            None => self.insert(
                "INSERT INTO follow_up_comments (follow_up_id, comment_text, created_at)
                 VALUES (?, ?, ?)",
                sql_params![follow_up_id, text, now],
            ),
        }
    }

    pub fn get_follow_up_comment(
        &mut self,
        id: i64,
    ) -> Result<Option<DbFollowUpComment>, DbError> {
        self.query_one(
            "SELECT id, follow_up_id, comment_text, created_at FROM follow_up_comments
             WHERE id = ?",
            sql_params![id],
        )?
        .map(|row| Self::map_comment_row(&row))
        .transpose()
    }

    pub fn update_follow_up_comment(&mut self, id: i64, text: &str) -> Result<bool, DbError> {
        let changed = self.execute(
            "UPDATE follow_up_comments SET comment_text = ? WHERE id = ?",
            sql_params![text, id],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_follow_up_comment(&mut self, id: i64) -> Result<bool, DbError> {
        Ok(self.execute("DELETE FROM follow_up_comments WHERE id = ?", sql_params![id])? > 0)
    }

    /// Comment thread of one opportunity, oldest first.
    pub fn follow_up_comments(
        &mut self,
        follow_up_id: i64,
    ) -> Result<Vec<DbFollowUpComment>, DbError> {
        let rows = self.query(
            "SELECT id, follow_up_id, comment_text, created_at FROM follow_up_comments
             WHERE follow_up_id = ? ORDER BY created_at, id",
            sql_params![follow_up_id],
        )?;
        rows.iter().map(Self::map_comment_row).collect()
    }

    pub fn delete_follow_up_comments(&mut self, follow_up_id: i64) -> Result<usize, DbError> {
        self.execute(
            "DELETE FROM follow_up_comments WHERE follow_up_id = ?",
            sql_params![follow_up_id],
        )
    }

    fn map_comment_row(row: &Row) -> Result<DbFollowUpComment, DbError> {
        Ok(DbFollowUpComment {
            id: row.get("id")?,
            follow_up_id: row.get("follow_up_id")?,
            comment_text: row.get("comment_text")?,
            created_at: row.text_or_empty("created_at")?,
        })
    }
}
