//! rankit/crates/rk-core/src/lib.rs
//!
//! The central domain logic and interface definitions for RankIt: rating
//! aggregation, the vote ledger and the services that orchestrate them over
//! the storage ports.

pub mod accounts;
pub mod error;
pub mod models;
pub mod rating;
pub mod requests;
pub mod service;
pub mod traits;
pub mod votes;

// Re-exporting for easier access in other crates
pub use accounts::AccountService;
pub use error::*;
pub use models::*;
pub use service::{parse_id, PostPages, RankService};
pub use traits::*;
