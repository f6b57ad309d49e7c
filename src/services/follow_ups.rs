// Follow-up ledger: opportunities, their priority tiers, open/closed state,
// linked entities and comment threads.

use serde::{Deserialize, Serialize};

use crate::db::{
    CrmDb, DbFollowUp, DbFollowUpComment, PriorityLevel, ProposalFields, ProposalRef,
    ProposalStatus, DEFAULT_OPP_TYPE,
};
use crate::entity::{Entity, EntityKind, EntityRef};
use crate::error::CrmError;
use crate::services::entities::lookup;

/// Submitted opportunity form.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FollowUpInput {
    pub title: String,
    pub body: String,
    pub opp_type: String,
    /// Entities to link, in display order.
    pub links: Vec<EntityRef>,
}

/// An opportunity with everything its card shows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpCard {
    pub follow_up: DbFollowUp,
    /// Linked entities that still exist, in link order.
    pub links: Vec<Entity>,
    /// Oldest first.
    pub comments: Vec<DbFollowUpComment>,
    pub proposals: Vec<ProposalRef>,
}

/// The opportunities board.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpBoard {
    pub open: Vec<FollowUpCard>,
    pub priority: Vec<FollowUpCard>,
    pub watch: Vec<FollowUpCard>,
    pub closed: Vec<FollowUpCard>,
}

struct Validated {
    title: String,
    body: String,
    opp_type: String,
}

fn validate(input: &FollowUpInput) -> Result<Validated, CrmError> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(CrmError::validation("Title is required."));
    }
    let opp_type = match input.opp_type.trim() {
        "" => DEFAULT_OPP_TYPE,
        t => t,
    };
    Ok(Validated {
        title: title.to_string(),
        body: input.body.trim().to_string(),
        opp_type: opp_type.to_string(),
    })
}

fn require(db: &mut CrmDb, id: i64) -> Result<DbFollowUp, CrmError> {
    db.get_follow_up(id)?
        .ok_or_else(|| CrmError::not_found("Opportunity", id))
}

fn insert_links(db: &mut CrmDb, id: i64, links: &[EntityRef]) -> Result<(), CrmError> {
    for entity in links {
        db.insert_follow_up_link(None, id, *entity)?;
    }
    Ok(())
}

/// Create an open opportunity at normal priority.
pub fn create(db: &mut CrmDb, id: Option<i64>, input: FollowUpInput) -> Result<i64, CrmError> {
    let v = validate(&input)?;
    let new_id = db.insert_follow_up(id, &v.title, &v.body, &v.opp_type)?;
    insert_links(db, new_id, &input.links)?;
    log::info!("Created opportunity {} with {} link(s)", new_id, input.links.len());
    Ok(new_id)
}

/// Overwrite title, body and type, and replace the link set.
pub fn update(db: &mut CrmDb, id: i64, input: FollowUpInput) -> Result<(), CrmError> {
    let v = validate(&input)?;
    require(db, id)?;
    db.update_follow_up(id, &v.title, &v.body, &v.opp_type)?;
    db.delete_follow_up_links(id)?;
    insert_links(db, id, &input.links)
}

/// Change only the body, as the inline editor does.
pub fn update_body(db: &mut CrmDb, id: i64, body: &str) -> Result<(), CrmError> {
    if !db.update_follow_up_body(id, body.trim())? {
        return Err(CrmError::not_found("Opportunity", id));
    }
    Ok(())
}

/// Toggle a priority tier.
///
/// Asking for the level the opportunity already has drops it back to
/// normal; any other level is set as given. Returns the resulting level.
pub fn set_priority(db: &mut CrmDb, id: i64, level: i64) -> Result<PriorityLevel, CrmError> {
    let requested = PriorityLevel::from_level(level)
        .ok_or_else(|| CrmError::validation("Invalid priority level."))?;
    let fu = require(db, id)?;
    let next = if fu.priority_level == requested {
        PriorityLevel::Normal
    } else {
        requested
    };
    db.set_follow_up_priority(id, next)?;
    Ok(next)
}

/// Close an open opportunity or reopen a closed one. Returns the new
/// `closed_at`.
pub fn toggle_close(db: &mut CrmDb, id: i64) -> Result<Option<String>, CrmError> {
    let fu = require(db, id)?;
    let closed_at = match fu.closed_at {
        None => Some(crate::db::now_timestamp()),
        Some(_) => None,
    };
    db.set_follow_up_closed_at(id, closed_at.as_deref())?;
    log::info!(
        "Opportunity {} {}",
        id,
        if closed_at.is_some() { "closed" } else { "reopened" }
    );
    Ok(closed_at)
}

/// Replace every link of an opportunity with `links`.
pub fn replace_links(db: &mut CrmDb, id: i64, links: &[EntityRef]) -> Result<(), CrmError> {
    require(db, id)?;
    db.delete_follow_up_links(id)?;
    insert_links(db, id, links)
}

/// Stored links of an opportunity, in link order.
pub fn links_for(db: &mut CrmDb, id: i64) -> Result<Vec<EntityRef>, CrmError> {
    Ok(db
        .follow_up_links(id)?
        .iter()
        .map(|link| link.entity())
        .collect())
}

/// Start a Draft proposal from an opportunity.
///
/// Linked individuals become the proposal's contacts, and the first of them
/// that still exists names the contact person.
pub fn convert_to_proposal(db: &mut CrmDb, id: i64) -> Result<i64, CrmError> {
    let fu = require(db, id)?;
    let fields = ProposalFields {
        name: fu.title.clone(),
        follow_up_id: Some(id),
        status: ProposalStatus::Draft,
        notes: Some(fu.body.clone()).filter(|b| !b.is_empty()),
        ..Default::default()
    };
    let proposal_id = db.insert_proposal(None, &fields)?;

    let mut contact_person: Option<String> = None;
    for link in db.follow_up_links(id)? {
        if link.entity_kind != EntityKind::Individual {
            continue;
        }
        db.insert_proposal_contact(None, proposal_id, link.entity_id)?;
        if contact_person.is_none() {
            contact_person = db.get_individual(link.entity_id)?.map(|i| i.name);
        }
    }
    if contact_person.is_some() {
        db.set_proposal_contact_person(proposal_id, contact_person.as_deref())?;
    }

    log::info!("Converted opportunity {} into proposal {}", id, proposal_id);
    Ok(proposal_id)
}

/// Delete an opportunity with its comments and links. Proposals that
/// reference it keep their `follow_up_id`.
pub fn delete(db: &mut CrmDb, id: i64) -> Result<(), CrmError> {
    require(db, id)?;
    db.delete_follow_up_comments(id)?;
    db.delete_follow_up_links(id)?;
    db.delete_follow_up(id)?;
    log::info!("Deleted opportunity {}", id);
    Ok(())
}

// =============================================================================
// Comments
// =============================================================================

pub fn add_comment(db: &mut CrmDb, follow_up_id: i64, text: &str) -> Result<i64, CrmError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CrmError::validation("Comment text is required."));
    }
    require(db, follow_up_id)?;
    Ok(db.insert_follow_up_comment(None, follow_up_id, text)?)
}

/// Edit a comment. Returns the opportunity it belongs to.
pub fn edit_comment(db: &mut CrmDb, comment_id: i64, text: &str) -> Result<i64, CrmError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CrmError::validation("Comment text is required."));
    }
    let comment = db
        .get_follow_up_comment(comment_id)?
        .ok_or_else(|| CrmError::not_found("Comment", comment_id))?;
    db.update_follow_up_comment(comment_id, text)?;
    Ok(comment.follow_up_id)
}

/// Delete a comment. Returns the opportunity it belonged to.
pub fn delete_comment(db: &mut CrmDb, comment_id: i64) -> Result<i64, CrmError> {
    let comment = db
        .get_follow_up_comment(comment_id)?
        .ok_or_else(|| CrmError::not_found("Comment", comment_id))?;
    db.delete_follow_up_comment(comment_id)?;
    Ok(comment.follow_up_id)
}

// =============================================================================
// Views
// =============================================================================

fn card(db: &mut CrmDb, follow_up: DbFollowUp) -> Result<FollowUpCard, CrmError> {
    let mut links = Vec::new();
    for link in db.follow_up_links(follow_up.id)? {
        if let Some(entity) = lookup(db, link.entity())? {
            links.push(entity);
        }
    }
    let comments = db.follow_up_comments(follow_up.id)?;
    let proposals = db.proposal_refs_for_follow_up(follow_up.id)?;
    Ok(FollowUpCard {
        follow_up,
        links,
        comments,
        proposals,
    })
}

fn cards(db: &mut CrmDb, follow_ups: Vec<DbFollowUp>) -> Result<Vec<FollowUpCard>, CrmError> {
    follow_ups.into_iter().map(|fu| card(db, fu)).collect()
}

/// Build the board.
///
/// With a filter, the tiers are carved out of the filtered open list (in its
/// order) instead of being queried in tier order.
pub fn board(db: &mut CrmDb, filter: Option<&str>) -> Result<FollowUpBoard, CrmError> {
    let filter = filter.map(str::trim).filter(|q| !q.is_empty());
    let open_rows = db.open_follow_ups(filter)?;
    let open = cards(db, open_rows)?;
    let closed_rows = db.closed_follow_ups(filter)?;
    let closed = cards(db, closed_rows)?;

    let (priority, watch) = match filter {
        Some(_) => {
            let tier = |level: PriorityLevel| -> Vec<FollowUpCard> {
                open.iter()
                    .filter(|c| c.follow_up.priority_level == level)
                    .cloned()
                    .collect()
            };
            (tier(PriorityLevel::Priority), tier(PriorityLevel::Watch))
        }
        None => {
            let priority = db.follow_ups_in_tier(PriorityLevel::Priority)?;
            let watch = db.follow_ups_in_tier(PriorityLevel::Watch)?;
            (cards(db, priority)?, cards(db, watch)?)
        }
    };

    Ok(FollowUpBoard {
        open,
        priority,
        watch,
        closed,
    })
}

/// Opportunities linked to an entity, for its detail page.
pub fn follow_ups_for_entity(
    db: &mut CrmDb,
    entity: EntityRef,
) -> Result<Vec<FollowUpCard>, CrmError> {
    let follow_ups = db.follow_ups_linked_to(entity)?;
    cards(db, follow_ups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_database;
    use crate::entity::{CompanyFields, EntityFields, IndividualFields};
    use crate::services::entities::add_entity;

    fn add_person(db: &mut CrmDb, name: &str) -> EntityRef {
        let id = add_entity(
            db,
            None,
            EntityFields::Individual(IndividualFields {
                name: name.into(),
                ..Default::default()
            }),
        )
        .unwrap();
        EntityRef::individual(id)
    }

    fn add_company(db: &mut CrmDb, name: &str) -> EntityRef {
        let id = add_entity(
            db,
            None,
            EntityFields::Company(CompanyFields {
                name: name.into(),
                ..Default::default()
            }),
        )
        .unwrap();
        EntityRef::company(id)
    }

    fn opp(db: &mut CrmDb, title: &str, links: Vec<EntityRef>) -> i64 {
        create(
            db,
            None,
            FollowUpInput {
                title: title.into(),
                links,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_create_defaults() {
        let database = test_database();
        let mut db = database.session();
        assert!(create(&mut db, None, FollowUpInput::default())
            .unwrap_err()
            .is_validation());

        let id = opp(&mut db, "  Website rebuild ", vec![]);
        let fu = db.get_follow_up(id).unwrap().unwrap();
        assert_eq!(fu.title, "Website rebuild");
        assert_eq!(fu.opp_type, "TBD");
        assert_eq!(fu.priority_level, PriorityLevel::Normal);
        assert!(fu.is_open());
    }

    #[test]
    fn test_set_priority_toggles() {
        let database = test_database();
        let mut db = database.session();
        let id = opp(&mut db, "Deal", vec![]);

        assert_eq!(set_priority(&mut db, id, 2).unwrap(), PriorityLevel::Priority);
        assert_eq!(set_priority(&mut db, id, 2).unwrap(), PriorityLevel::Normal);

        assert_eq!(set_priority(&mut db, id, 1).unwrap(), PriorityLevel::Watch);
        assert_eq!(set_priority(&mut db, id, 2).unwrap(), PriorityLevel::Priority);
        assert_eq!(
            db.get_follow_up(id).unwrap().unwrap().priority_level,
            PriorityLevel::Priority
        );

        assert!(set_priority(&mut db, id, 3).unwrap_err().is_validation());
        assert!(set_priority(&mut db, id + 1, 1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_toggle_close_is_an_involution() {
        let database = test_database();
        let mut db = database.session();
        let id = opp(&mut db, "Deal", vec![]);

        let closed = toggle_close(&mut db, id).unwrap();
        assert!(closed.is_some());
        assert_eq!(db.get_follow_up(id).unwrap().unwrap().closed_at, closed);

        assert_eq!(toggle_close(&mut db, id).unwrap(), None);
        assert!(db.get_follow_up(id).unwrap().unwrap().is_open());
    }

    #[test]
    fn test_replace_links_is_full_replace() {
        let database = test_database();
        let mut db = database.session();
        let acme = add_company(&mut db, "Acme");
        let a = add_person(&mut db, "A");
        let b = add_person(&mut db, "B");
        let id = opp(&mut db, "Deal", vec![acme, a]);

        replace_links(&mut db, id, &[b]).unwrap();
        assert_eq!(links_for(&mut db, id).unwrap(), [b]);

        replace_links(&mut db, id, &[]).unwrap();
        assert!(links_for(&mut db, id).unwrap().is_empty());

        assert!(replace_links(&mut db, id + 1, &[a]).unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_replaces_fields_and_links() {
        let database = test_database();
        let mut db = database.session();
        let acme = add_company(&mut db, "Acme");
        let a = add_person(&mut db, "A");
        let id = opp(&mut db, "Deal", vec![acme]);

        update(
            &mut db,
            id,
            FollowUpInput {
                title: "Bigger deal".into(),
                body: "scope grew".into(),
                opp_type: "Retainer".into(),
                links: vec![a],
            },
        )
        .unwrap();
        let fu = db.get_follow_up(id).unwrap().unwrap();
        assert_eq!(fu.title, "Bigger deal");
        assert_eq!(fu.opp_type, "Retainer");
        assert_eq!(links_for(&mut db, id).unwrap(), [a]);

        update_body(&mut db, id, "  just the body ").unwrap();
        assert_eq!(db.get_follow_up(id).unwrap().unwrap().body, "just the body");
        assert!(update_body(&mut db, id + 1, "x").unwrap_err().is_not_found());
    }

    #[test]
    fn test_convert_to_proposal_copies_individuals() {
        let database = test_database();
        let mut db = database.session();
        let acme = add_company(&mut db, "Acme");
        let a = add_person(&mut db, "Ada");
        let b = add_person(&mut db, "Bob");
        let id = opp(&mut db, "Website", vec![acme, a, b]);

        let pid = convert_to_proposal(&mut db, id).unwrap();
        let proposal = db.get_proposal(pid).unwrap().unwrap();
        assert_eq!(proposal.status, ProposalStatus::Draft);
        assert_eq!(proposal.name, "Website");
        assert_eq!(proposal.follow_up_id, Some(id));
        assert_eq!(proposal.contact_person.as_deref(), Some("Ada"));

        let contacts: Vec<i64> = db
            .proposal_contacts(pid)
            .unwrap()
            .iter()
            .map(|c| c.individual_id)
            .collect();
        assert_eq!(contacts, [a.id, b.id]);
    }

    #[test]
    fn test_convert_without_individuals_leaves_contact_unset() {
        let database = test_database();
        let mut db = database.session();
        let acme = add_company(&mut db, "Acme");
        let id = opp(&mut db, "Website", vec![acme]);
        let pid = convert_to_proposal(&mut db, id).unwrap();
        let proposal = db.get_proposal(pid).unwrap().unwrap();
        assert_eq!(proposal.contact_person, None);
        assert!(db.proposal_contacts(pid).unwrap().is_empty());
        assert!(convert_to_proposal(&mut db, id + 1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_keeps_referencing_proposals() {
        let database = test_database();
        let mut db = database.session();
        let a = add_person(&mut db, "Ada");
        let id = opp(&mut db, "Deal", vec![a]);
        add_comment(&mut db, id, "called").unwrap();
        let pid = convert_to_proposal(&mut db, id).unwrap();

        delete(&mut db, id).unwrap();
        assert!(db.get_follow_up(id).unwrap().is_none());
        assert!(db.follow_up_links(id).unwrap().is_empty());
        assert!(db.follow_up_comments(id).unwrap().is_empty());
        assert_eq!(db.get_proposal(pid).unwrap().unwrap().follow_up_id, Some(id));
        assert!(delete(&mut db, id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_comment_thread() {
        let database = test_database();
        let mut db = database.session();
        let id = opp(&mut db, "Deal", vec![]);
        assert!(add_comment(&mut db, id, " ").unwrap_err().is_validation());
        assert!(add_comment(&mut db, id + 1, "x").unwrap_err().is_not_found());

        let c1 = add_comment(&mut db, id, "first").unwrap();
        let c2 = add_comment(&mut db, id, "second").unwrap();
        assert_eq!(edit_comment(&mut db, c1, "first, edited").unwrap(), id);
        assert!(edit_comment(&mut db, c1, "").unwrap_err().is_validation());
        assert_eq!(delete_comment(&mut db, c2).unwrap(), id);
        assert!(delete_comment(&mut db, c2).unwrap_err().is_not_found());

        let board = board(&mut db, None).unwrap();
        let texts: Vec<&str> = board.open[0]
            .comments
            .iter()
            .map(|c| c.comment_text.as_str())
            .collect();
        assert_eq!(texts, ["first, edited"]);
    }

    #[test]
    fn test_board_partitions() {
        let database = test_database();
        let mut db = database.session();
        let acme = add_company(&mut db, "Acme");
        let a = opp(&mut db, "Alpha", vec![acme]);
        let b = opp(&mut db, "Beta", vec![]);
        let c = opp(&mut db, "Gamma", vec![]);
        let d = opp(&mut db, "Delta website", vec![]);
        set_priority(&mut db, a, 2).unwrap();
        set_priority(&mut db, b, 1).unwrap();
        set_priority(&mut db, d, 2).unwrap();
        toggle_close(&mut db, c).unwrap();
        // Tier order comes from priority_order, not the open list.
        db.execute(
            "UPDATE follow_ups SET priority_order = 1 WHERE id = ?",
            crate::sql_params![d],
        )
        .unwrap();

        let full = board(&mut db, None).unwrap();
        let ids = |cards: &[FollowUpCard]| -> Vec<i64> {
            cards.iter().map(|c| c.follow_up.id).collect()
        };
        assert_eq!(ids(&full.open), [d, b, a]);
        assert_eq!(ids(&full.priority), [a, d]);
        assert_eq!(ids(&full.watch), [b]);
        assert_eq!(ids(&full.closed), [c]);
        assert_eq!(full.open[2].links[0].name(), "Acme");

        let filtered = board(&mut db, Some("website")).unwrap();
        assert_eq!(ids(&filtered.open), [d]);
        assert_eq!(ids(&filtered.priority), [d]);
        assert!(filtered.watch.is_empty());
        assert!(filtered.closed.is_empty());
    }

    #[test]
    fn test_cards_skip_deleted_entities_and_list_proposals() {
        let database = test_database();
        let mut db = database.session();
        let a = add_person(&mut db, "Ada");
        let id = opp(&mut db, "Deal", vec![a, EntityRef::individual(999)]);
        let pid = convert_to_proposal(&mut db, id).unwrap();

        let cards = follow_ups_for_entity(&mut db, a).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].links.len(), 1);
        assert_eq!(cards[0].proposals.len(), 1);
        assert_eq!(cards[0].proposals[0].id, pid);
        assert_eq!(cards[0].proposals[0].status, ProposalStatus::Draft);
    }
}
