// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Email normalization.
//!
//! Email is the unique key of a user record, so every lookup, every role
//! mapping entry and every stored row goes through [`normalize_email`].

use unicode_normalization::UnicodeNormalization;

/// Normalize an email address: trim, NFKC, lowercase.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().nfkc().collect::<String>().to_lowercase()
}

/// Minimal shape check: one `@`, non-empty local part and a dotted domain,
/// no whitespace.
pub fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        _ => false,
    }
}
