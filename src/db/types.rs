//! Shared type definitions for the database layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{EntityKind, EntityRef};

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] postgres::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Column not present in result set: {0}")]
    MissingColumn(String),

    #[error("Column {column} is not of type {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
    },

    #[error("Unsupported column type: {0}")]
    UnsupportedType(String),

    #[error("Database backend not available in this build: {0}")]
    BackendUnavailable(String),

    #[error("Insert did not report a generated id")]
    NoGeneratedId,
}

/// Opportunity type recorded when none is given.
pub const DEFAULT_OPP_TYPE: &str = "TBD";

/// Priority tier of an open opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    #[default]
    Normal,
    Watch,
    Priority,
}

impl PriorityLevel {
    /// Stored integer level (0, 1, 2).
    pub fn level(self) -> i64 {
        match self {
            PriorityLevel::Normal => 0,
            PriorityLevel::Watch => 1,
            PriorityLevel::Priority => 2,
        }
    }

    /// Parse a requested level. Anything outside 0..=2 is rejected.
    pub fn from_level(level: i64) -> Option<Self> {
        match level {
            0 => Some(PriorityLevel::Normal),
            1 => Some(PriorityLevel::Watch),
            2 => Some(PriorityLevel::Priority),
            _ => None,
        }
    }

    /// Read a stored level, falling back to `Normal` for out-of-range values.
    pub fn from_stored(level: i64) -> Self {
        Self::from_level(level).unwrap_or_default()
    }
}

/// Proposal workflow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProposalStatus {
    #[default]
    Draft,
    Sent,
    Negotiating,
    Won,
    Lost,
}

impl ProposalStatus {
    pub const ALL: [ProposalStatus; 5] = [
        ProposalStatus::Draft,
        ProposalStatus::Sent,
        ProposalStatus::Negotiating,
        ProposalStatus::Won,
        ProposalStatus::Lost,
    ];

    /// String label for SQL storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Draft => "Draft",
            ProposalStatus::Sent => "Sent",
            ProposalStatus::Negotiating => "Negotiating",
            ProposalStatus::Won => "Won",
            ProposalStatus::Lost => "Lost",
        }
    }

    /// Strict parse of a submitted status.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// Parse from SQL string.
    pub fn from_str_lossy(s: &str) -> Self {
        Self::parse(s).unwrap_or_default()
    }

    /// Won and Lost close the linked opportunity.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProposalStatus::Won | ProposalStatus::Lost)
    }
}

/// A row from the `companies` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbCompany {
    pub id: i64,
    pub name: String,
    pub website: String,
    #[serde(rename = "type")]
    pub company_type: String,
    pub linkedin_url: String,
    pub location: String,
    pub sort_order: i64,
    pub created_at: String,
}

/// A row from the `individuals` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbIndividual {
    pub id: i64,
    pub name: String,
    pub title: String,
    pub email: String,
    pub phone: String,
    pub linkedin_url: String,
    pub location: String,
    pub sort_order: i64,
    pub created_at: String,
}

/// A row from the `relationships` table.
///
/// `from`/`to` only record which side created the edge; lookups treat the
/// edge as undirected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbRelationship {
    pub id: i64,
    pub from_kind: EntityKind,
    pub from_id: i64,
    pub to_kind: EntityKind,
    pub to_id: i64,
    pub relationship_type: String,
    pub created_at: String,
}

impl DbRelationship {
    pub fn from_ref(&self) -> EntityRef {
        EntityRef::new(self.from_kind, self.from_id)
    }

    pub fn to_ref(&self) -> EntityRef {
        EntityRef::new(self.to_kind, self.to_id)
    }

    /// The endpoint that is not `entity`. A self-edge resolves to itself.
    pub fn other_end(&self, entity: EntityRef) -> EntityRef {
        if self.from_ref() == entity {
            self.to_ref()
        } else {
            self.from_ref()
        }
    }
}

/// A row from the `notes` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbNote {
    pub id: i64,
    pub entity_kind: EntityKind,
    pub entity_id: i64,
    pub note_text: String,
    pub created_at: String,
}

impl DbNote {
    pub fn entity(&self) -> EntityRef {
        EntityRef::new(self.entity_kind, self.entity_id)
    }
}

/// A row from the `follow_ups` table (an opportunity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbFollowUp {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub opp_type: String,
    pub priority_level: PriorityLevel,
    pub priority_order: i64,
    pub sort_order: i64,
    pub closed_at: Option<String>,
    pub created_at: String,
}

impl DbFollowUp {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

/// A row from `follow_up_links`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbFollowUpLink {
    pub id: i64,
    pub follow_up_id: i64,
    pub entity_kind: EntityKind,
    pub entity_id: i64,
}

impl DbFollowUpLink {
    pub fn entity(&self) -> EntityRef {
        EntityRef::new(self.entity_kind, self.entity_id)
    }
}

/// A row from `follow_up_comments`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbFollowUpComment {
    pub id: i64,
    pub follow_up_id: i64,
    pub comment_text: String,
    pub created_at: String,
}

/// A row from the `proposals` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbProposal {
    pub id: i64,
    pub name: String,
    pub follow_up_id: Option<i64>,
    pub status: ProposalStatus,
    pub onboarding_fee: Option<f64>,
    pub onboarding_fee_max: Option<f64>,
    pub monthly_retainer: Option<f64>,
    pub monthly_retainer_max: Option<f64>,
    pub date_sent: Option<String>,
    pub notes: Option<String>,
    pub scope_of_work: Option<String>,
    pub timeline: Option<String>,
    /// Display name of the primary contact, denormalized from the first
    /// selected individual when not given explicitly.
    pub contact_person: Option<String>,
    pub follow_up_date: Option<String>,
    pub sort_order: i64,
    pub created_at: String,
}

/// Writable proposal attributes. Contacts are stored separately.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProposalFields {
    pub name: String,
    pub follow_up_id: Option<i64>,
    pub status: ProposalStatus,
    pub onboarding_fee: Option<f64>,
    pub onboarding_fee_max: Option<f64>,
    pub monthly_retainer: Option<f64>,
    pub monthly_retainer_max: Option<f64>,
    pub date_sent: Option<String>,
    pub notes: Option<String>,
    pub scope_of_work: Option<String>,
    pub timeline: Option<String>,
    pub contact_person: Option<String>,
    pub follow_up_date: Option<String>,
}

/// A row from `proposal_contacts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbProposalContact {
    pub id: i64,
    pub proposal_id: i64,
    pub individual_id: i64,
}

/// Minimal `(id, name)` pair used for pickers and resolved references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedRef {
    pub id: i64,
    pub name: String,
}

/// Proposal summary shown on an opportunity card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalRef {
    pub id: i64,
    pub name: String,
    pub status: ProposalStatus,
}
