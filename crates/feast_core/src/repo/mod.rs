//! Repository layer over the restaurant store file.
//!
//! # Responsibility
//! - Keep SQL details inside the persistence boundary.
//! - Serve the persistent lane, which is the only writer of the file.
//!
//! # Invariants
//! - Writes call `Restaurant::validate()` before touching SQL.

pub mod restaurant_repo;
