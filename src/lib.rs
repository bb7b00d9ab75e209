// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Clinic Access - Role resolution and access control service
//!
//! Assigns clinic roles to users signing in through the identity provider
//! and guards protected clinic resources by role.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Identity verification, role resolution, sessions and the access guard
//! - `config` - Environment configuration
//! - `storage` - Identity database (redb) and audit trail

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod state;
pub mod storage;
