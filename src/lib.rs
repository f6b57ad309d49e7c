//! Relationship management core: companies, individuals, the relationships
//! between them, opportunities and proposals, over SQLite or PostgreSQL.

pub mod db;
pub mod entity;
pub mod error;
mod migrations;
pub mod services;
pub mod state;
pub mod types;

pub use db::{CrmDb, Database};
pub use error::CrmError;
