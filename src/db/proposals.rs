use super::*;
use crate::sql_params;

impl CrmDb {
    // =========================================================================
    // Proposals
    // =========================================================================

    /// Insert a proposal, keeping `id` when one is given.
    pub fn insert_proposal(
        &mut self,
        id: Option<i64>,
        fields: &ProposalFields,
    ) -> Result<i64, DbError> {
        let now = now_timestamp();
        match id {
            Some(id) => self.insert_with_id(
                id,
                "INSERT INTO proposals
                    (id, name, follow_up_id, status, onboarding_fee, onboarding_fee_max,
                     monthly_retainer, monthly_retainer_max, date_sent, notes, scope_of_work,
                     timeline, contact_person, follow_up_date, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                sql_params![
                    id,
                    &fields.name,
                    fields.follow_up_id,
                    fields.status.as_str(),
                    fields.onboarding_fee,
                    fields.onboarding_fee_max,
                    fields.monthly_retainer,
                    fields.monthly_retainer_max,
                    fields.date_sent.as_ref(),
                    fields.notes.as_ref(),
                    fields.scope_of_work.as_ref(),
                    fields.timeline.as_ref(),
                    fields.contact_person.as_ref(),
                    fields.follow_up_date.as_ref(),
                    now,
                ],
            ),
            None => self.insert(
                "INSERT INTO proposals
                    (name, follow_up_id, status, onboarding_fee, onboarding_fee_max,
                     monthly_retainer, monthly_retainer_max, date_sent, notes, scope_of_work,
                     timeline, contact_person, follow_up_date, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                sql_params![
                    &fields.name,
                    fields.follow_up_id,
                    fields.status.as_str(),
                    fields.onboarding_fee,
                    fields.onboarding_fee_max,
                    fields.monthly_retainer,
                    fields.monthly_retainer_max,
                    fields.date_sent.as_ref(),
                    fields.notes.as_ref(),
                    fields.scope_of_work.as_ref(),
                    fields.timeline.as_ref(),
                    fields.contact_person.as_ref(),
                    fields.follow_up_date.as_ref(),
                    now,
                ],
            ),
        }
    }

    pub fn get_proposal(&mut self, id: i64) -> Result<Option<DbProposal>, DbError> {
        self.query_one(
            "SELECT id, name, follow_up_id, status, onboarding_fee, onboarding_fee_max,
                    monthly_retainer, monthly_retainer_max, date_sent, notes, scope_of_work,
                    timeline, contact_person, follow_up_date, sort_order, created_at
             FROM proposals WHERE id = ?",
            sql_params![id],
        )?
        .map(|row| Self::map_proposal_row(&row))
        .transpose()
    }

    /// Overwrite every writable attribute. Returns false if no such row.
    pub fn update_proposal(&mut self, id: i64, fields: &ProposalFields) -> Result<bool, DbError> {
        let changed = self.execute(
            "UPDATE proposals
             SET name = ?, follow_up_id = ?, status = ?, onboarding_fee = ?,
                 onboarding_fee_max = ?, monthly_retainer = ?, monthly_retainer_max = ?,
                 date_sent = ?, notes = ?, scope_of_work = ?, timeline = ?,
                 contact_person = ?, follow_up_date = ?
             WHERE id = ?",
            sql_params![
                &fields.name,
                fields.follow_up_id,
                fields.status.as_str(),
                fields.onboarding_fee,
                fields.onboarding_fee_max,
                fields.monthly_retainer,
                fields.monthly_retainer_max,
                fields.date_sent.as_ref(),
                fields.notes.as_ref(),
                fields.scope_of_work.as_ref(),
                fields.timeline.as_ref(),
                fields.contact_person.as_ref(),
                fields.follow_up_date.as_ref(),
                id,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn set_proposal_status(
        &mut self,
        id: i64,
        status: ProposalStatus,
    ) -> Result<bool, DbError> {
        let changed = self.execute(
            "UPDATE proposals SET status = ? WHERE id = ?",
            sql_params![status.as_str(), id],
        )?;
        Ok(changed > 0)
    }

    pub fn set_proposal_contact_person(
        &mut self,
        id: i64,
        contact_person: Option<&str>,
    ) -> Result<bool, DbError> {
        let changed = self.execute(
            "UPDATE proposals SET contact_person = ? WHERE id = ?",
            sql_params![contact_person, id],
        )?;
        Ok(changed > 0)
    }

    /// Delete the proposal row only.
    pub fn delete_proposal(&mut self, id: i64) -> Result<bool, DbError> {
        Ok(self.execute("DELETE FROM proposals WHERE id = ?", sql_params![id])? > 0)
    }

    /// Proposals in one status column.
    ///
    /// Active statuses follow their manual order; Won and Lost are always
    /// newest first.
    pub fn proposals_with_status(
        &mut self,
        status: ProposalStatus,
    ) -> Result<Vec<DbProposal>, DbError> {
        let sql = if status.is_terminal() {
            "SELECT id, name, follow_up_id, status, onboarding_fee, onboarding_fee_max,
                    monthly_retainer, monthly_retainer_max, date_sent, notes, scope_of_work,
                    timeline, contact_person, follow_up_date, sort_order, created_at
             FROM proposals WHERE status = ?
             ORDER BY created_at DESC, id DESC"
        } else {
            "SELECT id, name, follow_up_id, status, onboarding_fee, onboarding_fee_max,
                    monthly_retainer, monthly_retainer_max, date_sent, notes, scope_of_work,
                    timeline, contact_person, follow_up_date, sort_order, created_at
             FROM proposals WHERE status = ?
             ORDER BY sort_order, created_at DESC, id DESC"
        };
        let rows = self.query(sql, sql_params![status.as_str()])?;
        rows.iter().map(Self::map_proposal_row).collect()
    }

    /// Proposals referencing an opportunity.
    pub fn proposal_refs_for_follow_up(
        &mut self,
        follow_up_id: i64,
    ) -> Result<Vec<ProposalRef>, DbError> {
        let rows = self.query(
            "SELECT id, name, status FROM proposals WHERE follow_up_id = ? ORDER BY id",
            sql_params![follow_up_id],
        )?;
        rows.iter()
            .map(|row| {
                Ok(ProposalRef {
                    id: row.get("id")?,
                    name: row.get("name")?,
                    status: ProposalStatus::from_str_lossy(&row.text_or_empty("status")?),
                })
            })
            .collect()
    }

    fn map_proposal_row(row: &Row) -> Result<DbProposal, DbError> {
        Ok(DbProposal {
            id: row.get("id")?,
            name: row.get("name")?,
            follow_up_id: row.get("follow_up_id")?,
            status: ProposalStatus::from_str_lossy(&row.text_or_empty("status")?),
            onboarding_fee: row.get("onboarding_fee")?,
            onboarding_fee_max: row.get("onboarding_fee_max")?,
            monthly_retainer: row.get("monthly_retainer")?,
            monthly_retainer_max: row.get("monthly_retainer_max")?,
            date_sent: row.get("date_sent")?,
            notes: row.get("notes")?,
            scope_of_work: row.get("scope_of_work")?,
            timeline: row.get("timeline")?,
            contact_person: row.get("contact_person")?,
            follow_up_date: row.get("follow_up_date")?,
            sort_order: row.get::<Option<i64>>("sort_order")?.unwrap_or(0),
            created_at: row.text_or_empty("created_at")?,
        })
    }

    // =========================================================================
    // Proposal contacts
    // =========================================================================

    pub fn insert_proposal_contact(
        &mut self,
        id: Option<i64>,
        proposal_id: i64,
        individual_id: i64,
    ) -> Result<i64, DbError> {
        match id {
            Some(id) => self.insert_with_id(
                id,
                "INSERT INTO proposal_contacts (id, proposal_id, individual_id) VALUES (?, ?, ?)",
                sql_params![id, proposal_id, individual_id],
            ),
            None => self.insert(
                "INSERT INTO proposal_contacts (proposal_id, individual_id) VALUES (?, ?)",
                sql_params![proposal_id, individual_id],
            ),
        }
    }

    /// Contact rows of one proposal, in insertion order.
    pub fn proposal_contacts(
        &mut self,
        proposal_id: i64,
    ) -> Result<Vec<DbProposalContact>, DbError> {
        let rows = self.query(
            "SELECT id, proposal_id, individual_id FROM proposal_contacts
             WHERE proposal_id = ? ORDER BY id",
            sql_params![proposal_id],
        )?;
        rows.iter()
            .map(|row| {
                Ok(DbProposalContact {
                    id: row.get("id")?,
                    proposal_id: row.get("proposal_id")?,
                    individual_id: row.get("individual_id")?,
                })
            })
            .collect()
    }

    /// Contacts of one proposal resolved to names. Rows pointing at a
    /// deleted individual are skipped.
    pub fn proposal_contact_refs(&mut self, proposal_id: i64) -> Result<Vec<NamedRef>, DbError> {
        let rows = self.query(
            "SELECT i.id AS id, i.name AS name
             FROM proposal_contacts pc
             JOIN individuals i ON i.id = pc.individual_id
             WHERE pc.proposal_id = ?
             ORDER BY pc.id",
            sql_params![proposal_id],
        )?;
        rows.iter().map(Self::map_named_ref).collect()
    }

    pub fn delete_proposal_contacts(&mut self, proposal_id: i64) -> Result<usize, DbError> {
        self.execute(
            "DELETE FROM proposal_contacts WHERE proposal_id = ?",
            sql_params![proposal_id],
        )
    }
}
