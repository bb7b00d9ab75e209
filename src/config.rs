// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding `identity.redb` | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files; serve HTTPS when both are set | unset (HTTP) |
//! | `IDP_JWKS_URL` | Identity provider JWKS endpoint (HTTPS) | unset |
//! | `IDP_SHARED_SECRET` | HS256 secret, used when no JWKS URL is set | unset |
//! | `IDP_ISSUER` | Expected token issuer | unset (not checked) |
//! | `IDP_AUDIENCE` | Expected token audience | unset (not checked) |
//! | `IDP_JWKS_CACHE_SECS` | How long a fetched key set counts as fresh | `300` |
//! | `ALLOW_PROFILE_FALLBACK` | Accept the client profile payload when no token verifies | `true` |
//! | `ROLE_MAPPING` | `email=role` pairs for exceptional accounts | empty |
//! | `DEFAULT_ROLE` | Role for unmapped emails | `student` |
//! | `UNASSIGNED_ROLE_FALLBACK` | Role the guard assumes for users without one (`none` to deny) | `nurse` |
//! | `ACCESS_POLICY` | Overrides, `resource=role,role;...` | built-in policy |
//! | `SESSION_TTL_SECS` | Session lifetime | `28800` |
//! | `SESSION_CAPACITY` | Max live sessions | `10000` |
//! | `SESSION_SWEEP_SECS` | Expired-session sweep interval | `300` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! Durations are whole seconds and must be greater than zero.

use std::path::PathBuf;
use std::time::Duration;

use jsonwebtoken::DecodingKey;

use crate::auth::policy::PolicyError;
use crate::auth::resolver::MappingError;
use crate::auth::roles::RoleKind;
use crate::auth::session::expiry_after;
use crate::auth::{
    jwks, AccessGuard, AccessPolicy, IdentityVerifier, JwksManager, RoleMapping, VerifierMode,
};

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const IDP_JWKS_URL_ENV: &str = "IDP_JWKS_URL";
pub const IDP_SHARED_SECRET_ENV: &str = "IDP_SHARED_SECRET";
pub const IDP_ISSUER_ENV: &str = "IDP_ISSUER";
pub const IDP_AUDIENCE_ENV: &str = "IDP_AUDIENCE";
pub const IDP_JWKS_CACHE_SECS_ENV: &str = "IDP_JWKS_CACHE_SECS";
pub const ALLOW_PROFILE_FALLBACK_ENV: &str = "ALLOW_PROFILE_FALLBACK";
pub const ROLE_MAPPING_ENV: &str = "ROLE_MAPPING";
pub const DEFAULT_ROLE_ENV: &str = "DEFAULT_ROLE";
pub const UNASSIGNED_ROLE_FALLBACK_ENV: &str = "UNASSIGNED_ROLE_FALLBACK";
pub const ACCESS_POLICY_ENV: &str = "ACCESS_POLICY";
pub const SESSION_TTL_SECS_ENV: &str = "SESSION_TTL_SECS";
pub const SESSION_CAPACITY_ENV: &str = "SESSION_CAPACITY";
pub const SESSION_SWEEP_SECS_ENV: &str = "SESSION_SWEEP_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_DATA_DIR: &str = "/data";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SESSION_TTL_SECS: u64 = 8 * 60 * 60;
const DEFAULT_SESSION_CAPACITY: usize = 10_000;
const DEFAULT_SESSION_SWEEP_SECS: u64 = 300;

/// Database file name inside the data directory.
pub const IDENTITY_DB_FILE: &str = "identity.redb";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}': {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("ROLE_MAPPING: {0}")]
    RoleMapping(#[from] MappingError),
    #[error("ACCESS_POLICY: {0}")]
    AccessPolicy(#[from] PolicyError),
    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    IncompleteTls,
    #[error("IDP_JWKS_URL: {0}")]
    Jwks(String),
}

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// How identity tokens are verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenVerification {
    Jwks(String),
    SharedSecret(String),
    /// No verification configured.
    None,
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Fully parsed runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsPaths>,
    pub token_verification: TokenVerification,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub jwks_cache_ttl: Duration,
    pub allow_profile_fallback: bool,
    pub role_mapping: String,
    pub default_role: RoleKind,
    pub unassigned_role_fallback: Option<RoleKind>,
    pub access_policy: Option<String>,
    pub session_ttl: Duration,
    pub session_capacity: usize,
    pub session_sweep_interval: Duration,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        let token_verification = match (get(IDP_JWKS_URL_ENV), get(IDP_SHARED_SECRET_ENV)) {
            (Some(url), _) => TokenVerification::Jwks(url),
            (None, Some(secret)) => TokenVerification::SharedSecret(secret),
            (None, None) => TokenVerification::None,
        };

        let default_role = match get(DEFAULT_ROLE_ENV) {
            Some(v) => parse_role(DEFAULT_ROLE_ENV, &v)?,
            None => RoleKind::Student,
        };

        let unassigned_role_fallback = match get(UNASSIGNED_ROLE_FALLBACK_ENV) {
            Some(v) if v.eq_ignore_ascii_case("none") => None,
            Some(v) => Some(parse_role(UNASSIGNED_ROLE_FALLBACK_ENV, &v)?),
            None => Some(RoleKind::Nurse),
        };

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: LOG_FORMAT_ENV,
                    value: other.to_string(),
                    reason: "expected 'json' or 'pretty'".to_string(),
                })
            }
        };

        let session_ttl = parse_seconds(
            SESSION_TTL_SECS_ENV,
            get(SESSION_TTL_SECS_ENV),
            DEFAULT_SESSION_TTL_SECS,
        )?;
        if expiry_after(chrono::Utc::now(), session_ttl).is_none() {
            return Err(ConfigError::InvalidValue {
                name: SESSION_TTL_SECS_ENV,
                value: session_ttl.as_secs().to_string(),
                reason: "session expiry would overflow the date range".to_string(),
            });
        }

        Ok(Self {
            data_dir: get(DATA_DIR_ENV)
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())
                .into(),
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_number(PORT_ENV, get(PORT_ENV), DEFAULT_PORT)?,
            tls,
            token_verification,
            issuer: get(IDP_ISSUER_ENV),
            audience: get(IDP_AUDIENCE_ENV),
            jwks_cache_ttl: parse_seconds(
                IDP_JWKS_CACHE_SECS_ENV,
                get(IDP_JWKS_CACHE_SECS_ENV),
                jwks::DEFAULT_CACHE_TTL.as_secs(),
            )?,
            allow_profile_fallback: parse_bool(
                ALLOW_PROFILE_FALLBACK_ENV,
                get(ALLOW_PROFILE_FALLBACK_ENV),
                true,
            )?,
            role_mapping: get(ROLE_MAPPING_ENV).unwrap_or_default(),
            default_role,
            unassigned_role_fallback,
            access_policy: get(ACCESS_POLICY_ENV),
            session_ttl,
            session_capacity: parse_number(
                SESSION_CAPACITY_ENV,
                get(SESSION_CAPACITY_ENV),
                DEFAULT_SESSION_CAPACITY,
            )?,
            session_sweep_interval: parse_seconds(
                SESSION_SWEEP_SECS_ENV,
                get(SESSION_SWEEP_SECS_ENV),
                DEFAULT_SESSION_SWEEP_SECS,
            )?,
            log_format,
        })
    }

    /// Path of the identity database.
    pub fn identity_db_path(&self) -> PathBuf {
        self.data_dir.join(IDENTITY_DB_FILE)
    }

    pub fn role_mapping(&self) -> Result<RoleMapping, ConfigError> {
        Ok(RoleMapping::parse(&self.role_mapping, self.default_role)?)
    }

    pub fn access_guard(&self) -> AccessGuard {
        AccessGuard::new(self.unassigned_role_fallback)
    }

    /// Built-in policy with `ACCESS_POLICY` overrides applied.
    pub fn access_policy(&self) -> Result<AccessPolicy, ConfigError> {
        match &self.access_policy {
            Some(overrides) => Ok(AccessPolicy::default().with_overrides(overrides)?),
            None => Ok(AccessPolicy::default()),
        }
    }

    pub fn identity_verifier(&self) -> Result<IdentityVerifier, ConfigError> {
        let mode = match &self.token_verification {
            TokenVerification::Jwks(url) => VerifierMode::Jwks(
                JwksManager::new(url)
                    .map_err(|e| ConfigError::Jwks(e.to_string()))?
                    .with_cache_ttl(self.jwks_cache_ttl),
            ),
            TokenVerification::SharedSecret(secret) => {
                VerifierMode::SharedSecret(DecodingKey::from_secret(secret.as_bytes()))
            }
            #[cfg(feature = "dev")]
            TokenVerification::None => {
                tracing::warn!("No identity provider configured, decoding tokens WITHOUT signature checks");
                VerifierMode::Insecure
            }
            #[cfg(not(feature = "dev"))]
            TokenVerification::None => {
                tracing::warn!("No identity provider configured, ID tokens will be rejected");
                VerifierMode::Disabled
            }
        };

        let mut verifier = IdentityVerifier::new(mode).with_fallback(self.allow_profile_fallback);
        if let Some(issuer) = &self.issuer {
            verifier = verifier.with_issuer(issuer.clone());
        }
        if let Some(audience) = &self.audience {
            verifier = verifier.with_audience(audience.clone());
        }
        Ok(verifier)
    }
}

fn parse_role(name: &'static str, value: &str) -> Result<RoleKind, ConfigError> {
    value.parse().map_err(|e: crate::auth::roles::UnknownRole| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_number<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name,
            value: v.clone(),
            reason: e.to_string(),
        }),
    }
}

/// Whole seconds, rejecting zero.
fn parse_seconds(name: &'static str, value: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    match parse_number(name, value, default)? {
        0 => Err(ConfigError::InvalidValue {
            name,
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn parse_bool(name: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match value.as_deref().map(str::to_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue {
            name,
            value: other.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
