//! The two tracked entity kinds (companies and individuals).
//!
//! They share no table, so everywhere a reference may point at either kind
//! it is carried as an `EntityRef` and resolved through a single `match` on
//! `EntityKind`. Kind tags are never interpolated into SQL.

use serde::{Deserialize, Serialize};

use crate::db::{DbCompany, DbIndividual};

/// Which table an entity lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Company,
    Individual,
}

impl EntityKind {
    /// String label for SQL storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Company => "company",
            EntityKind::Individual => "individual",
        }
    }

    /// Strict parse of a submitted kind tag.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "company" => Some(EntityKind::Company),
            "individual" => Some(EntityKind::Individual),
            _ => None,
        }
    }

    /// Parse from SQL string. Anything that is not a company is an individual.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "company" => EntityKind::Company,
            _ => EntityKind::Individual,
        }
    }

    /// Noun used in user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Company => "Company",
            EntityKind::Individual => "Individual",
        }
    }
}

/// A `(kind, id)` pointer at an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn company(id: i64) -> Self {
        Self::new(EntityKind::Company, id)
    }

    pub fn individual(id: i64) -> Self {
        Self::new(EntityKind::Individual, id)
    }
}

/// A resolved entity of either kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Company(DbCompany),
    Individual(DbIndividual),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Company(_) => EntityKind::Company,
            Entity::Individual(_) => EntityKind::Individual,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Entity::Company(c) => c.id,
            Entity::Individual(i) => i.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::Company(c) => &c.name,
            Entity::Individual(i) => &i.name,
        }
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind(), self.id())
    }
}

/// Editable company attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanyFields {
    pub name: String,
    pub website: String,
    #[serde(rename = "type")]
    pub company_type: String,
    pub linkedin_url: String,
    pub location: String,
}

/// Editable individual attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndividualFields {
    pub name: String,
    pub title: String,
    pub email: String,
    pub phone: String,
    pub linkedin_url: String,
    pub location: String,
}

/// Attributes for either kind; the variant decides the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityFields {
    Company(CompanyFields),
    Individual(IndividualFields),
}

impl EntityFields {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityFields::Company(_) => EntityKind::Company,
            EntityFields::Individual(_) => EntityKind::Individual,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EntityFields::Company(f) => &f.name,
            EntityFields::Individual(f) => &f.name,
        }
    }

    /// Trim every attribute in place.
    pub fn trimmed(self) -> Self {
        fn t(s: String) -> String {
            s.trim().to_string()
        }
        match self {
            EntityFields::Company(f) => EntityFields::Company(CompanyFields {
                name: t(f.name),
                website: t(f.website),
                company_type: t(f.company_type),
                linkedin_url: t(f.linkedin_url),
                location: t(f.location),
            }),
            EntityFields::Individual(f) => EntityFields::Individual(IndividualFields {
                name: t(f.name),
                title: t(f.title),
                email: t(f.email),
                phone: t(f.phone),
                linkedin_url: t(f.linkedin_url),
                location: t(f.location),
            }),
        }
    }
}
