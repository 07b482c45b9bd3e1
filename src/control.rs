//! HTTP endpoint through which the network announces which backend a player
//! is allowed to transfer to.
//!
//! `GET /verify?name=..&ts=..&host=..&port=..&sign=..` where `sign` is the
//! lowercase hex SHA-256 of `name:ts:host:port:secret` over the raw query
//! values. Every reply is HTTP 200 with a JSON `{code, msg}` body.

use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use log::{debug, info};
use serde_derive::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;

use crate::backend::BackendAddress;
use crate::cfg::ControlConfig;
use crate::registry::RoutingRegistry;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VerifyQuery {
    pub name: String,
    pub ts: String,
    pub host: String,
    pub port: String,
    pub sign: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyReply {
    pub code: u32,
    pub msg: String,
}

impl VerifyReply {
    fn ok() -> Self {
        VerifyReply {
            code: 0,
            msg: "OK".to_string(),
        }
    }
}

impl From<VerifyError> for VerifyReply {
    fn from(err: VerifyError) -> Self {
        VerifyReply {
            code: err.code(),
            msg: err.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Timestamp expired")]
    Expired,
    #[error("Invalid host")]
    InvalidHost,
    #[error("Failed to parse timestamp")]
    InvalidTimestamp,
    #[error("Failed to parse port")]
    InvalidPort,
}

impl VerifyError {
    pub fn code(&self) -> u32 {
        match self {
            VerifyError::InvalidSignature => 100,
            VerifyError::Expired => 101,
            VerifyError::InvalidHost => 102,
            VerifyError::InvalidTimestamp => 103,
            VerifyError::InvalidPort => 104,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Verifier {
    secret: String,
    host_suffix: String,
    max_age_ms: i64,
}

impl Verifier {
    pub fn new(secret: impl Into<String>, host_suffix: impl Into<String>, max_age_ms: i64) -> Self {
        Verifier {
            secret: secret.into(),
            host_suffix: host_suffix.into(),
            max_age_ms,
        }
    }

    pub fn from_config(config: &ControlConfig) -> Self {
        Verifier::new(&config.secret, &config.host_suffix, config.max_age_ms)
    }

    pub fn sign(&self, name: &str, ts: &str, host: &str, port: &str) -> String {
        let digest = Sha256::digest(format!("{}:{}:{}:{}:{}", name, ts, host, port, self.secret));
        format!("{:x}", digest)
    }

    /// Checks a request against the clock `now_ms`, returning the backend it
    /// names when everything holds.
    pub fn check(&self, query: &VerifyQuery, now_ms: i64) -> Result<BackendAddress, VerifyError> {
        let ts: i64 = query
            .ts
            .parse()
            .map_err(|_| VerifyError::InvalidTimestamp)?;
        let port: u16 = query.port.parse().map_err(|_| VerifyError::InvalidPort)?;
        if now_ms.saturating_sub(ts) >= self.max_age_ms {
            return Err(VerifyError::Expired);
        }
        if !query.host.ends_with(&self.host_suffix) {
            return Err(VerifyError::InvalidHost);
        }
        if self.sign(&query.name, &query.ts, &query.host, &query.port) != query.sign {
            return Err(VerifyError::InvalidSignature);
        }
        Ok(BackendAddress::new(query.host.clone(), port))
    }
}

#[derive(Clone)]
struct ControlState {
    registry: Arc<RoutingRegistry>,
    verifier: Arc<Verifier>,
}

pub fn router(registry: Arc<RoutingRegistry>, verifier: Verifier) -> Router {
    Router::new()
        .route("/verify", get(verify))
        .with_state(ControlState {
            registry,
            verifier: Arc::new(verifier),
        })
}

async fn verify(
    State(state): State<ControlState>,
    Query(query): Query<VerifyQuery>,
) -> Json<VerifyReply> {
    let now_ms = chrono::Utc::now().timestamp_millis();
    match state.verifier.check(&query, now_ms) {
        Ok(backend) => {
            let shown = backend.to_string();
            state.registry.verify(&query.name, backend).await;
            info!(
                "Verified {} for {} ({} players verified)",
                query.name,
                shown,
                state.registry.verified_count().await
            );
            Json(VerifyReply::ok())
        }
        Err(err) => {
            debug!("Rejected verification for {}: {}", query.name, err);
            Json(err.into())
        }
    }
}

pub async fn serve(config: &ControlConfig, registry: Arc<RoutingRegistry>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind control endpoint on {}", config.bind))?;
    info!("Control endpoint listening on {}", listener.local_addr()?);
    axum::serve(listener, router(registry, Verifier::from_config(config)))
        .await
        .context("control endpoint stopped")
}
