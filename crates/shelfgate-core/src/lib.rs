//! # Shelfgate Core
//!
//! Security core of the Shelfgate library booking API.
//!
//! This crate provides the foundational components for:
//!
//! - **[`auth`]**: API key credentials, authorization contexts and the reference
//!   [`InMemoryKeyStore`](auth::InMemoryKeyStore) with hourly and daily usage windows.
//!
//! - **[`password`]**: bcrypt hashing with a minimum-duration floor, rehash checks,
//!   benchmarking and configuration recommendations.
//!
//! - **[`middleware`]**: key authentication, permission and scope checks, sanitization,
//!   injection detection, schema and upload validation.
//!
//! - **[`monitor`]**: security event reporting.
//!
//! - **[`config`]**: layered application configuration.
//!
//! Nothing here depends on an HTTP framework. The `server` crate adapts these pieces to
//! axum middleware.

pub mod auth;
pub mod config;
pub mod middleware;
pub mod monitor;
pub mod password;
