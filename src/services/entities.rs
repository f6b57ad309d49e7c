// Entity service: companies and individuals, their notes, list and detail views.

use serde::Serialize;

use crate::db::{CrmDb, DbError, DbNote, NamedRef};
use crate::entity::{Entity, EntityFields, EntityKind, EntityRef};
use crate::error::CrmError;
use crate::services::follow_ups::{self, FollowUpCard};
use crate::services::relationships::{self, Edge};
use crate::types::{CompanySort, IndividualSort, SortDir};

/// One row of an entity list page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityListRow {
    pub entity: Entity,
    /// Names of every entity on the other end of this one's relationships.
    pub related_names: Vec<String>,
}

/// Everything shown on an entity's detail page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDetail {
    pub entity: Entity,
    pub notes: Vec<DbNote>,
    pub relationships: Vec<Edge>,
    pub follow_ups: Vec<FollowUpCard>,
}

/// Choices for the relationship and opportunity forms.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPicker {
    pub companies: Vec<NamedRef>,
    pub individuals: Vec<NamedRef>,
}

/// Resolve a reference to the row it points at, dispatching on kind.
pub fn lookup(db: &mut CrmDb, entity: EntityRef) -> Result<Option<Entity>, DbError> {
    Ok(match entity.kind {
        EntityKind::Company => db.get_company(entity.id)?.map(Entity::Company),
        EntityKind::Individual => db.get_individual(entity.id)?.map(Entity::Individual),
    })
}

/// Like `lookup`, but a missing row is `NotFound`.
pub fn get_entity(db: &mut CrmDb, entity: EntityRef) -> Result<Entity, CrmError> {
    lookup(db, entity)?.ok_or_else(|| CrmError::not_found(entity.kind.label(), entity.id))
}

fn validated(fields: EntityFields) -> Result<EntityFields, CrmError> {
    let fields = fields.trimmed();
    if fields.name().is_empty() {
        return Err(CrmError::validation("Name is required."));
    }
    Ok(fields)
}

/// Create a company or individual. Returns the new id.
pub fn add_entity(
    db: &mut CrmDb,
    id: Option<i64>,
    fields: EntityFields,
) -> Result<i64, CrmError> {
    let fields = validated(fields)?;
    let new_id = match &fields {
        EntityFields::Company(f) => db.insert_company(id, f)?,
        EntityFields::Individual(f) => db.insert_individual(id, f)?,
    };
    log::info!("Added {} {}", fields.kind().as_str(), new_id);
    Ok(new_id)
}

/// Overwrite an entity's attributes. The kind is taken from `fields`.
pub fn update_entity(db: &mut CrmDb, id: i64, fields: EntityFields) -> Result<(), CrmError> {
    let fields = validated(fields)?;
    let updated = match &fields {
        EntityFields::Company(f) => db.update_company(id, f)?,
        EntityFields::Individual(f) => db.update_individual(id, f)?,
    };
    if !updated {
        log::warn!("Update skipped: {} {} does not exist", fields.kind().as_str(), id);
        return Err(CrmError::not_found(fields.kind().label(), id));
    }
    Ok(())
}

/// Delete an entity together with its notes and every relationship edge
/// touching it.
///
/// Opportunity links and proposal contacts pointing at the entity are left
/// in place; readers skip them.
pub fn delete_entity(db: &mut CrmDb, entity: EntityRef) -> Result<(), CrmError> {
    if lookup(db, entity)?.is_none() {
        log::warn!("Delete skipped: {} {} does not exist", entity.kind.as_str(), entity.id);
        return Err(CrmError::not_found(entity.kind.label(), entity.id));
    }

    let notes = db.delete_notes_for(entity)?;
    let edges = db.delete_relationships_for(entity)?;
    match entity.kind {
        EntityKind::Company => db.delete_company(entity.id)?,
        EntityKind::Individual => db.delete_individual(entity.id)?,
    };
    log::info!(
        "Deleted {} {} ({} notes, {} relationships)",
        entity.kind.as_str(),
        entity.id,
        notes,
        edges
    );
    Ok(())
}

/// List one kind of entity.
///
/// `sort` is checked against the columns that kind allows; anything else
/// sorts by name. `dir` is descending only when it says `desc`.
pub fn list_entities(
    db: &mut CrmDb,
    kind: EntityKind,
    filter: Option<&str>,
    sort: &str,
    dir: &str,
) -> Result<Vec<EntityListRow>, CrmError> {
    let dir = SortDir::parse(dir);
    let entities: Vec<Entity> = match kind {
        EntityKind::Company => db
            .list_companies(filter, CompanySort::parse(sort), dir)?
            .into_iter()
            .map(Entity::Company)
            .collect(),
        EntityKind::Individual => db
            .list_individuals(filter, IndividualSort::parse(sort), dir)?
            .into_iter()
            .map(Entity::Individual)
            .collect(),
    };

    let mut rows = Vec::with_capacity(entities.len());
    for entity in entities {
        let related_names = relationships::edges_for(db, entity.entity_ref())?
            .into_iter()
            .map(|edge| edge.other.name().to_string())
            .collect();
        rows.push(EntityListRow {
            entity,
            related_names,
        });
    }
    Ok(rows)
}

/// Entity plus notes, relationships and linked opportunities.
pub fn entity_detail(db: &mut CrmDb, entity: EntityRef) -> Result<EntityDetail, CrmError> {
    let resolved = get_entity(db, entity)?;
    Ok(EntityDetail {
        entity: resolved,
        notes: db.notes_for(entity)?,
        relationships: relationships::edges_for(db, entity)?,
        follow_ups: follow_ups::follow_ups_for_entity(db, entity)?,
    })
}

pub fn entity_picker(db: &mut CrmDb) -> Result<EntityPicker, CrmError> {
    Ok(EntityPicker {
        companies: db.company_refs()?,
        individuals: db.individual_refs()?,
    })
}

// =============================================================================
// Notes
// =============================================================================

/// Attach a note to an existing entity.
pub fn add_note(
    db: &mut CrmDb,
    id: Option<i64>,
    entity: EntityRef,
    text: &str,
) -> Result<i64, CrmError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CrmError::validation("Note text is required."));
    }
    get_entity(db, entity)?;
    Ok(db.insert_note(id, entity, text)?)
}

/// Delete a note. Returns the entity it belonged to.
pub fn delete_note(db: &mut CrmDb, id: i64) -> Result<EntityRef, CrmError> {
    let note = db.get_note(id)?.ok_or_else(|| CrmError::not_found("Note", id))?;
    db.delete_note(id)?;
    Ok(note.entity())
}

/// Notes on an entity, newest first.
pub fn notes_for(db: &mut CrmDb, entity: EntityRef) -> Result<Vec<DbNote>, CrmError> {
    Ok(db.notes_for(entity)?)
}
