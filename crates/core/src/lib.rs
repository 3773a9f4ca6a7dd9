//! Domain types and pure logic for the airdrop tracker.
//!
//! Nothing in this crate performs I/O. The server (`airdrop-api`) and the
//! client core (`airdrop-client`) both build on these types so the wire shape
//! of a project is defined in exactly one place.

pub mod error;
pub mod filter;
pub mod project;
pub mod types;
pub mod validation;
pub mod wire;
