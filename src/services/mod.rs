//! Core operations over a request session.
//!
//! Every function takes the caller's `&mut CrmDb` and leaves committing to
//! the caller (see `Database::with_request`). Inputs are validated before the
//! first write, so a rejected call leaves nothing behind even if the caller
//! does commit.

pub mod entities;
pub mod follow_ups;
pub mod ordering;
pub mod proposals;
pub mod relationships;
