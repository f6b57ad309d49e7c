// Relationship graph: typed edges between any two entities, queried from either end.

use serde::Serialize;

use crate::db::{CrmDb, DbRelationship};
use crate::entity::{Entity, EntityRef};
use crate::error::CrmError;
use crate::services::entities::{get_entity, lookup};

/// An edge as seen from one of its endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub relationship: DbRelationship,
    /// The endpoint that is not the queried entity.
    pub other: Entity,
}

/// Connect two existing entities with a labelled edge.
///
/// Duplicate edges between the same pair are allowed.
pub fn link(
    db: &mut CrmDb,
    id: Option<i64>,
    from: EntityRef,
    to: EntityRef,
    label: &str,
) -> Result<i64, CrmError> {
    let label = label.trim();
    if label.is_empty() {
        return Err(CrmError::validation("Relationship type is required."));
    }
    get_entity(db, from)?;
    get_entity(db, to)?;

    let rel_id = db.insert_relationship(id, from, to, label)?;
    log::info!(
        "Linked {} {} -> {} {}",
        from.kind.as_str(),
        from.id,
        to.kind.as_str(),
        to.id
    );
    Ok(rel_id)
}

/// Remove an edge. Returns it so the caller can go back to either endpoint.
pub fn unlink(db: &mut CrmDb, id: i64) -> Result<DbRelationship, CrmError> {
    let rel = db
        .get_relationship(id)?
        .ok_or_else(|| CrmError::not_found("Relationship", id))?;
    db.delete_relationship(id)?;
    log::info!("Deleted relationship {}", id);
    Ok(rel)
}

/// Every edge touching `entity`, each once, with the far endpoint resolved.
///
/// Edges whose far endpoint no longer exists are skipped.
pub fn edges_for(db: &mut CrmDb, entity: EntityRef) -> Result<Vec<Edge>, CrmError> {
    let rels = db.relationships_for(entity)?;
    let mut edges = Vec::with_capacity(rels.len());
    for relationship in rels {
        let other_ref = relationship.other_end(entity);
        match lookup(db, other_ref)? {
            Some(other) => edges.push(Edge {
                relationship,
                other,
            }),
            None => log::debug!(
                "Skipping relationship {} to missing {} {}",
                relationship.id,
                other_ref.kind.as_str(),
                other_ref.id
            ),
        }
    }
    Ok(edges)
}
