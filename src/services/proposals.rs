// Proposal pipeline: status workflow, contacts, and auto-closing the linked opportunity.

use serde::Serialize;

use crate::db::{CrmDb, DbProposal, NamedRef, ProposalFields, ProposalStatus};
use crate::error::CrmError;

/// A proposal with the names its board card shows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalCard {
    pub proposal: DbProposal,
    /// Title of the linked opportunity, if it still exists.
    pub opportunity_title: Option<String>,
    pub contacts: Vec<NamedRef>,
}

/// Proposals bucketed by status.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalBoard {
    pub draft: Vec<ProposalCard>,
    pub sent: Vec<ProposalCard>,
    pub negotiating: Vec<ProposalCard>,
    pub won: Vec<ProposalCard>,
    pub lost: Vec<ProposalCard>,
}

/// Choices for the proposal form.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalPicker {
    pub follow_ups: Vec<NamedRef>,
    pub individuals: Vec<NamedRef>,
}

/// Read a money field as typed into the proposal form. Blank means unset.
pub fn parse_amount(field: &str, raw: &str) -> Result<Option<f64>, CrmError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(amount) if amount.is_finite() => Ok(Some(amount)),
        _ => Err(CrmError::MalformedInput(format!("{field} must be a number."))),
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Trim, require a name, and fill `contact_person` from the first selected
/// contact when none was given.
fn prepare(
    db: &mut CrmDb,
    fields: ProposalFields,
    contact_ids: &[i64],
) -> Result<ProposalFields, CrmError> {
    let name = fields.name.trim().to_string();
    if name.is_empty() {
        return Err(CrmError::validation("Proposal name is required."));
    }
    let mut fields = ProposalFields {
        name,
        date_sent: trimmed(fields.date_sent),
        notes: trimmed(fields.notes),
        scope_of_work: trimmed(fields.scope_of_work),
        timeline: trimmed(fields.timeline),
        contact_person: trimmed(fields.contact_person),
        follow_up_date: trimmed(fields.follow_up_date),
        ..fields
    };
    if fields.contact_person.is_none() {
        if let Some(first) = contact_ids.first() {
            fields.contact_person = db.get_individual(*first)?.map(|i| i.name);
        }
    }
    Ok(fields)
}

fn insert_contacts(db: &mut CrmDb, proposal_id: i64, contact_ids: &[i64]) -> Result<(), CrmError> {
    for individual_id in contact_ids {
        db.insert_proposal_contact(None, proposal_id, *individual_id)?;
    }
    Ok(())
}

/// Close the linked opportunity if `status` is terminal. An opportunity that
/// is already closed keeps its timestamp.
fn auto_close(
    db: &mut CrmDb,
    status: ProposalStatus,
    follow_up_id: Option<i64>,
) -> Result<(), CrmError> {
    if !status.is_terminal() {
        return Ok(());
    }
    if let Some(fu_id) = follow_up_id {
        if db.close_follow_up_if_open(fu_id)? {
            log::info!("Auto-closed opportunity {} ({})", fu_id, status.as_str());
        }
    }
    Ok(())
}

/// Create a proposal with its contacts. Returns the new id.
pub fn create(
    db: &mut CrmDb,
    id: Option<i64>,
    fields: ProposalFields,
    contact_ids: &[i64],
) -> Result<i64, CrmError> {
    let fields = prepare(db, fields, contact_ids)?;
    let proposal_id = db.insert_proposal(id, &fields)?;
    insert_contacts(db, proposal_id, contact_ids)?;
    auto_close(db, fields.status, fields.follow_up_id)?;
    log::info!("Created proposal {}", proposal_id);
    Ok(proposal_id)
}

/// Overwrite a proposal and replace its contact set.
pub fn update(
    db: &mut CrmDb,
    id: i64,
    fields: ProposalFields,
    contact_ids: &[i64],
) -> Result<(), CrmError> {
    let fields = prepare(db, fields, contact_ids)?;
    if !db.update_proposal(id, &fields)? {
        return Err(CrmError::not_found("Proposal", id));
    }
    db.delete_proposal_contacts(id)?;
    insert_contacts(db, id, contact_ids)?;
    auto_close(db, fields.status, fields.follow_up_id)
}

/// Move a proposal to `status`. Any status may follow any other.
pub fn set_status(db: &mut CrmDb, id: i64, status: &str) -> Result<ProposalStatus, CrmError> {
    let status =
        ProposalStatus::parse(status).ok_or_else(|| CrmError::validation("Invalid status."))?;
    let proposal = get(db, id)?;
    db.set_proposal_status(id, status)?;
    auto_close(db, status, proposal.follow_up_id)?;
    Ok(status)
}

pub fn get(db: &mut CrmDb, id: i64) -> Result<DbProposal, CrmError> {
    db.get_proposal(id)?
        .ok_or_else(|| CrmError::not_found("Proposal", id))
}

/// Delete a proposal and its contact rows.
pub fn delete(db: &mut CrmDb, id: i64) -> Result<(), CrmError> {
    get(db, id)?;
    db.delete_proposal_contacts(id)?;
    db.delete_proposal(id)?;
    log::info!("Deleted proposal {}", id);
    Ok(())
}

/// Contacts of a proposal that still exist, in selection order.
pub fn contacts_for(db: &mut CrmDb, id: i64) -> Result<Vec<NamedRef>, CrmError> {
    Ok(db.proposal_contact_refs(id)?)
}

fn card(db: &mut CrmDb, proposal: DbProposal) -> Result<ProposalCard, CrmError> {
    let opportunity_title = match proposal.follow_up_id {
        Some(fu_id) => db.get_follow_up(fu_id)?.map(|fu| fu.title),
        None => None,
    };
    let contacts = db.proposal_contact_refs(proposal.id)?;
    Ok(ProposalCard {
        proposal,
        opportunity_title,
        contacts,
    })
}

fn column(db: &mut CrmDb, status: ProposalStatus) -> Result<Vec<ProposalCard>, CrmError> {
    let proposals = db.proposals_with_status(status)?;
    proposals.into_iter().map(|p| card(db, p)).collect()
}

/// Build the proposals board, one column per status.
pub fn board(db: &mut CrmDb) -> Result<ProposalBoard, CrmError> {
    Ok(ProposalBoard {
        draft: column(db, ProposalStatus::Draft)?,
        sent: column(db, ProposalStatus::Sent)?,
        negotiating: column(db, ProposalStatus::Negotiating)?,
        won: column(db, ProposalStatus::Won)?,
        lost: column(db, ProposalStatus::Lost)?,
    })
}

pub fn picker(db: &mut CrmDb) -> Result<ProposalPicker, CrmError> {
    Ok(ProposalPicker {
        follow_ups: db.follow_up_refs()?,
        individuals: db.individual_refs()?,
    })
}
