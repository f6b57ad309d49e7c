use super::*;
use crate::entity::CompanyFields;
use crate::sql_params;
use crate::types::{like_pattern, CompanySort, SortDir};

impl CrmDb {
    // =========================================================================
    // Companies
    // =========================================================================

    /// Insert a company. With `id` set the row keeps that id (restores);
    /// otherwise the backend assigns one.
    pub fn insert_company(
        &mut self,
        id: Option<i64>,
        fields: &CompanyFields,
    ) -> Result<i64, DbError> {
        let now = now_timestamp();
        match id {
            Some(id) => self.insert_with_id(
                id,
                "INSERT INTO companies (id, name, website, type, linkedin_url, location, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                sql_params![
                    id,
                    &fields.name,
                    &fields.website,
                    &fields.company_type,
                    &fields.linkedin_url,
                    &fields.location,
                    now,
                ],
            ),
            None => self.insert(
                "INSERT INTO companies (name, website, type, linkedin_url, location, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                sql_params![
                    &fields.name,
                    &fields.website,
                    &fields.company_type,
                    &fields.linkedin_url,
                    &fields.location,
                    now,
                ],
            ),
        }
    }

    /// Get a company by ID.
    pub fn get_company(&mut self, id: i64) -> Result<Option<DbCompany>, DbError> {
        self.query_one(
            "SELECT id, name, website, type, linkedin_url, location, sort_order, created_at
             FROM companies WHERE id = ?",
            sql_params![id],
        )?
        .map(|row| Self::map_company_row(&row))
        .transpose()
    }

    /// Overwrite a company's editable fields. Returns false if no such row.
    pub fn update_company(&mut self, id: i64, fields: &CompanyFields) -> Result<bool, DbError> {
        let changed = self.execute(
            "UPDATE companies SET name = ?, website = ?, type = ?, linkedin_url = ?, location = ?
             WHERE id = ?",
            sql_params![
                &fields.name,
                &fields.website,
                &fields.company_type,
                &fields.linkedin_url,
                &fields.location,
                id,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Delete the company row only. Dependent rows are the caller's concern.
    pub fn delete_company(&mut self, id: i64) -> Result<bool, DbError> {
        Ok(self.execute("DELETE FROM companies WHERE id = ?", sql_params![id])? > 0)
    }

    /// List companies, optionally filtered by a substring of name or type.
    pub fn list_companies(
        &mut self,
        filter: Option<&str>,
        sort: CompanySort,
        dir: SortDir,
    ) -> Result<Vec<DbCompany>, DbError> {
        let order = sort.order_clause(dir, self.text_collation());
        let rows = match filter.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let pattern = like_pattern(q);
                let contains = self.contains_op();
                let sql = [
                    "SELECT id, name, website, type, linkedin_url, location, sort_order, created_at
                     FROM companies
                     WHERE name",
                    contains,
                    " OR COALESCE(type, '')",
                    contains,
                    order.as_str(),
                ]
                .concat();
                self.query(&sql, sql_params![&pattern, &pattern])?
            }
            None => {
                let sql = [
                    "SELECT id, name, website, type, linkedin_url, location, sort_order, created_at
                     FROM companies",
                    order.as_str(),
                ]
                .concat();
                self.query(&sql, &[])?
            }
        };
        rows.iter().map(Self::map_company_row).collect()
    }

    /// `(id, name)` of every company, for pickers.
    pub fn company_refs(&mut self) -> Result<Vec<NamedRef>, DbError> {
        let sql = [
            "SELECT id, name FROM companies ORDER BY name",
            self.text_collation(),
            ", id",
        ]
        .concat();
        let rows = self.query(&sql, &[])?;
        rows.iter().map(Self::map_named_ref).collect()
    }

    pub(crate) fn map_company_row(row: &Row) -> Result<DbCompany, DbError> {
        Ok(DbCompany {
            id: row.get("id")?,
            name: row.get("name")?,
            website: row.text_or_empty("website")?,
            company_type: row.text_or_empty("type")?,
            linkedin_url: row.text_or_empty("linkedin_url")?,
            location: row.text_or_empty("location")?,
            sort_order: row.get::<Option<i64>>("sort_order")?.unwrap_or(0),
            created_at: row.text_or_empty("created_at")?,
        })
    }

    pub(crate) fn map_named_ref(row: &Row) -> Result<NamedRef, DbError> {
        Ok(NamedRef {
            id: row.get("id")?,
            name: row.get("name")?,
        })
    }
}
