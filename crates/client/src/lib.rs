//! Client-side core of the airdrop tracker.
//!
//! Local state lives in a [`RecordStore`](store::RecordStore); every
//! user-initiated change goes through the
//! [`MutationCoordinator`](coordinator::MutationCoordinator), which applies it
//! optimistically, writes it through a [`RemoteGateway`](gateway::RemoteGateway)
//! and reloads everything from the server when the write fails.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod notify;
pub mod store;
