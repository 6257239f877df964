//! Shared types for mpay.
//!
//! `objects` holds the Service API and notification wire types,
//! `signature` the processor webhook signature scheme. The typed HTTP
//! client lives behind the `client` feature.

pub mod objects;
pub mod signature;

#[cfg(feature = "client")]
pub mod client;
