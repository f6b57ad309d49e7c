use super::*;
use crate::entity::IndividualFields;
use crate::sql_params;
use crate::types::{like_pattern, IndividualSort, SortDir};

impl CrmDb {
    // =========================================================================
    // Individuals
    // =========================================================================

    /// Insert an individual, keeping `id` when one is given.
    pub fn insert_individual(
        &mut self,
        id: Option<i64>,
        fields: &IndividualFields,
    ) -> Result<i64, DbError> {
        let now = now_timestamp();
        match id {
            Some(id) => self.insert_with_id(
                id,
                "INSERT INTO individuals (id, name, title, email, phone, linkedin_url, location, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                sql_params![
                    id,
                    &fields.name,
                    &fields.title,
                    &fields.email,
                    &fields.phone,
                    &fields.linkedin_url,
                    &fields.location,
                    now,
                ],
            ),
            None => self.insert(
                "INSERT INTO individuals (name, title, email, phone, linkedin_url, location, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                sql_params![
                    &fields.name,
                    &fields.title,
                    &fields.email,
                    &fields.phone,
                    &fields.linkedin_url,
                    &fields.location,
                    now,
                ],
            ),
        }
    }

    pub fn get_individual(&mut self, id: i64) -> Result<Option<DbIndividual>, DbError> {
        self.query_one(
            "SELECT id, name, title, email, phone, linkedin_url, location, sort_order, created_at
             FROM individuals WHERE id = ?",
            sql_params![id],
        )?
        .map(|row| Self::map_individual_row(&row))
        .transpose()
    }

    /// Overwrite an individual's editable fields. Returns false if no such row.
    pub fn update_individual(
        &mut self,
        id: i64,
        fields: &IndividualFields,
    ) -> Result<bool, DbError> {
        let changed = self.execute(
            "UPDATE individuals
             SET name = ?, title = ?, email = ?, phone = ?, linkedin_url = ?, location = ?
             WHERE id = ?",
            sql_params![
                &fields.name,
                &fields.title,
                &fields.email,
                &fields.phone,
                &fields.linkedin_url,
                &fields.location,
                id,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_individual(&mut self, id: i64) -> Result<bool, DbError> {
        Ok(self.execute("DELETE FROM individuals WHERE id = ?", sql_params![id])? > 0)
    }

    /// List individuals, optionally filtered by a substring of name, title
    /// or email.
    pub fn list_individuals(
        &mut self,
        filter: Option<&str>,
        sort: IndividualSort,
        dir: SortDir,
    ) -> Result<Vec<DbIndividual>, DbError> {
        let order = sort.order_clause(dir, self.text_collation());
        let rows = match filter.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let pattern = like_pattern(q);
                let contains = self.contains_op();
                let sql = [
                    "SELECT id, name, title, email, phone, linkedin_url, location, sort_order, created_at
                     FROM individuals
                     WHERE name",
                    contains,
                    " OR COALESCE(title, '')",
                    contains,
                    " OR COALESCE(email, '')",
                    contains,
                    order.as_str(),
                ]
                .concat();
                self.query(&sql, sql_params![&pattern, &pattern, &pattern])?
            }
            None => {
                let sql = [
                    "SELECT id, name, title, email, phone, linkedin_url, location, sort_order, created_at
                     FROM individuals",
                    order.as_str(),
                ]
                .concat();
                self.query(&sql, &[])?
            }
        };
        rows.iter().map(Self::map_individual_row).collect()
    }

    /// `(id, name)` of every individual, for pickers.
    pub fn individual_refs(&mut self) -> Result<Vec<NamedRef>, DbError> {
        let sql = [
            "SELECT id, name FROM individuals ORDER BY name",
            self.text_collation(),
            ", id",
        ]
        .concat();
        let rows = self.query(&sql, &[])?;
        rows.iter().map(Self::map_named_ref).collect()
    }

    pub(crate) fn map_individual_row(row: &Row) -> Result<DbIndividual, DbError> {
        Ok(DbIndividual {
            id: row.get("id")?,
            name: row.get("name")?,
            title: row.text_or_empty("title")?,
            email: row.text_or_empty("email")?,
            phone: row.text_or_empty("phone")?,
            linkedin_url: row.text_or_empty("linkedin_url")?,
            location: row.text_or_empty("location")?,
            sort_order: row.get::<Option<i64>>("sort_order")?.unwrap_or(0),
            created_at: row.text_or_empty("created_at")?,
        })
    }
}
