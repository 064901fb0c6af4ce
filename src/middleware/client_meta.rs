//! Client metadata extractor
//!
//! Resolves the client IP and User-Agent for audit records. The IP comes
//! from X-Forwarded-For, then X-Real-IP, then the peer address; among the
//! forwarded candidates the first public one wins. No ambient globals:
//! handlers take `ClientMeta` as an explicit parameter.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header::USER_AGENT, request::Parts},
};

use crate::utils::net::is_private_ip_str;

/// Client IP and User-Agent as recorded in the audit trail.
#[derive(Debug, Clone)]
pub struct ClientMeta {
    /// Resolved client IP, or "-" when nothing usable was found
    pub ip_address: String,
    pub user_agent: String,
}

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("")
            .to_string();

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        let ip_address = resolve_ip(parts, peer);
        Ok(Self {
            ip_address,
            user_agent,
        })
    }
}

fn resolve_ip(parts: &Parts, peer: Option<String>) -> String {
    let mut candidates: Vec<String> = Vec::new();

    if let Some(forwarded) = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
    {
        candidates.extend(forwarded.split(',').map(|s| s.trim().to_string()));
    }
    if let Some(real_ip) = parts
        .headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
    {
        candidates.push(real_ip.trim().to_string());
    }

    // First forwarded candidate that parses as a public address wins
    for candidate in &candidates {
        if is_private_ip_str(candidate) == Some(false) {
            return candidate.clone();
        }
    }

    peer.unwrap_or_else(|| "-".to_string())
}
