//! Shared wire and domain types for the marketplace relay and its HTTP feeders.

pub mod api;
pub mod events;
pub mod models;
