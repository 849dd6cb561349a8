//! Application Layer
//!
//! Contains the export use case that orchestrates the domain rules.
//! Use cases depend on domain gateways (abstractions), not concrete implementations.

pub mod use_cases;
