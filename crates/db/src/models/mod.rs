//! Row structs and DTOs.
//!
//! Each submodule contains a `FromRow` entity struct matching the table row
//! and the DTOs the repositories accept.

pub mod project;
pub mod user;
