//! Shared helpers

pub mod helpers;

pub use helpers::{elapsed_ms, generate_id, parse_keypair};
