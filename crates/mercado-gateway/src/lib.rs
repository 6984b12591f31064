//! Real-time conversation and notification relay.
//!
//! A connection is admitted by the [`auth::AuthGate`], registered in the
//! [`registry::ConnectionRegistry`], hydrated with a [`snapshot`], and then
//! feeds inbound frames through the [`router`] to the [`handlers`]. HTTP-path
//! code pushes notifications through the [`bridge`].

pub mod auth;
pub mod bridge;
pub mod connection;
pub mod handlers;
pub mod registry;
pub mod relay;
pub mod router;
pub mod snapshot;

pub use relay::Relay;

#[cfg(test)]
pub(crate) mod testing;
