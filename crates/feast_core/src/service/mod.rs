//! Use-case services composed from the api and store layers.

pub mod sync_service;
