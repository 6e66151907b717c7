//! Integration tests for Shelfgate
//!
//! These tests drive the full server router, built from real core components, through
//! `tower::ServiceExt::oneshot`. No network or external services are needed.
//!
//! - `middleware_chain_tests`: ordering of key auth, grant checks and validation stages
//! - `adversarial_tests`: hostile inputs, forged keys, timing and deep payloads
//! - `password_tests`: hashing configuration flowing from `AppConfig` into the service
//! - `support`: shared app construction and request helpers
//!
//! ```bash
//! cargo test --package tests
//! ```

#[cfg(test)]
mod support;

#[cfg(test)]
mod middleware_chain_tests;

#[cfg(test)]
mod adversarial_tests;

#[cfg(test)]
mod password_tests;
