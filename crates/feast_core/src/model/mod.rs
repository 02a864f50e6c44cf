//! Restaurant domain model.
//!
//! # Responsibility
//! - Define the single record type synchronized from the remote API.
//! - Define the identity assigned to a record once it enters a layer.
//!
//! # Invariants
//! - `identifier` is assigned by the remote source and never rewritten.
//! - Every inserted row gets its own `ObjectId`; identifiers may repeat.

pub mod restaurant;
