//! URL handling module for SiteVigil
//!
//! This module provides URL canonicalization, seed-domain scoping and the
//! block classifier that keeps tag pages, pagination and static assets out
//! of the frontier.

mod blocklist;
mod canonical;
mod domain;

pub use blocklist::{classify_block, BlockReport, BlockRule};
pub use canonical::{canonicalize, canonicalize_in_scope, repair_scheme};
pub use domain::{registrable_domain, SeedScope};
