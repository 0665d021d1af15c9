//! Local resource collections.
//!
//! This module provides the `ResourceStore`, which emulates a remote REST
//! collection API (list with search and pagination, get, create, update,
//! delete) on top of the shared `Storage`, including simulated latency.

pub mod record;
pub mod store;

pub use record::{ListQuery, Page, Record};
pub use store::ResourceStore;
