// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

//! Endpoint discovery for Xtream-style panels.
//!
//! Panels do not agree on where the player API lives, so each candidate
//! path is asked for `get_live_categories` in priority order and the
//! response is judged by a [`ValidatorChain`]. A 200 status means little on
//! its own: many panels answer 200 with an error envelope or an HTML
//! "forbidden" page.

use super::query::{PanelAction, build_query, normalize_endpoint_path};
use super::types::{PanelCategory, extract_list};
use crate::error::{SourceError, SourceResult};
use crate::http::HttpFetch;
use crate::model::Credentials;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NotServed(u16),
    Status(u16),
    Transport(String),
    EmptyBody,
    Denied(String),
    ErrorEnvelope(String),
    Malformed(String),
    EmptyList,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotServed(status) => write!(f, "not served here (HTTP {})", status),
            Self::Status(status) => write!(f, "HTTP {}", status),
            Self::Transport(msg) => write!(f, "request failed: {}", msg),
            Self::EmptyBody => write!(f, "empty body"),
            Self::Denied(msg) => write!(f, "access denied: {}", msg),
            Self::ErrorEnvelope(msg) => write!(f, "panel returned an error: {}", msg),
            Self::Malformed(msg) => write!(f, "unrecognized response: {}", msg),
            Self::EmptyList => write!(f, "no categories"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept(Vec<PanelCategory>),
    Reject(RejectReason),
    Inconclusive,
}

/// What a validator gets to look at for one candidate.
pub struct ProbeResponse<'a> {
    pub status: u16,
    pub body: &'a str,
    pub json: Option<&'a Value>,
}

pub type Validator = fn(&ProbeResponse<'_>) -> Verdict;

const DENIAL_MARKERS: [&str; 8] = [
    "forbidden",
    "access denied",
    "not allowed",
    "unauthorized",
    "blocked",
    "invalid credentials",
    "auth failed",
    "banned",
];

fn reject_not_served(r: &ProbeResponse<'_>) -> Verdict {
    match r.status {
        403 | 404 => Verdict::Reject(RejectReason::NotServed(r.status)),
        _ => Verdict::Inconclusive,
    }
}

fn reject_non_ok(r: &ProbeResponse<'_>) -> Verdict {
    if r.status == 200 {
        Verdict::Inconclusive
    } else {
        Verdict::Reject(RejectReason::Status(r.status))
    }
}

fn reject_trivial_body(r: &ProbeResponse<'_>) -> Verdict {
    let body = r.body.trim();
    if body.is_empty() || body == "null" {
        Verdict::Reject(RejectReason::EmptyBody)
    } else {
        Verdict::Inconclusive
    }
}

// Only for bodies that are not JSON structures, so a category called
// "Forbidden Planet" cannot trip it.
fn reject_denial_text(r: &ProbeResponse<'_>) -> Verdict {
    let text = match r.json {
        Some(Value::String(s)) => s.to_lowercase(),
        Some(_) => return Verdict::Inconclusive,
        None => r.body.to_lowercase(),
    };
    match DENIAL_MARKERS.iter().find(|m| text.contains(*m)) {
        Some(marker) => Verdict::Reject(RejectReason::Denied(marker.to_string())),
        None => Verdict::Inconclusive,
    }
}

fn reject_error_envelope(r: &ProbeResponse<'_>) -> Verdict {
    let Some(Value::Object(map)) = r.json else {
        return Verdict::Inconclusive;
    };
    if let Some(error) = map.get("error") {
        let message = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Verdict::Reject(RejectReason::ErrorEnvelope(message));
    }
    let auth = map.get("user_info").and_then(|info| info.get("auth"));
    if matches!(auth, Some(Value::Number(n)) if n.as_i64() == Some(0)) {
        return Verdict::Reject(RejectReason::Denied("auth 0".to_string()));
    }
    Verdict::Inconclusive
}

fn accept_category_list(r: &ProbeResponse<'_>) -> Verdict {
    let Some(json) = r.json else {
        return Verdict::Inconclusive;
    };
    let Some(items) = extract_list(json) else {
        return Verdict::Inconclusive;
    };
    if items.is_empty() {
        return Verdict::Reject(RejectReason::EmptyList);
    }
    match serde_json::from_value::<Vec<PanelCategory>>(Value::Array(items.clone())) {
        Ok(categories) => Verdict::Accept(categories),
        Err(e) => Verdict::Reject(RejectReason::Malformed(e.to_string())),
    }
}

/// Ordered predicates; the first non-inconclusive verdict wins and a chain
/// that never decides rejects.
#[derive(Clone)]
pub struct ValidatorChain {
    validators: Vec<(&'static str, Validator)>,
}

impl ValidatorChain {
    pub fn new() -> Self {
        Self {
            validators: Vec::new(),
        }
    }

    pub fn with(mut self, name: &'static str, validator: Validator) -> Self {
        self.validators.push((name, validator));
        self
    }

    pub fn standard() -> Self {
        Self::new()
            .with("not-served", reject_not_served)
            .with("non-ok", reject_non_ok)
            .with("trivial-body", reject_trivial_body)
            .with("denial-text", reject_denial_text)
            .with("error-envelope", reject_error_envelope)
            .with("category-list", accept_category_list)
    }

    pub fn evaluate(&self, status: u16, body: &str) -> Verdict {
        let json = serde_json::from_str::<Value>(body.trim()).ok();
        let response = ProbeResponse {
            status,
            body,
            json: json.as_ref(),
        };

        for (name, validator) in &self.validators {
            match validator(&response) {
                Verdict::Inconclusive => continue,
                verdict => {
                    debug!("Validator '{}' decided", name);
                    return verdict;
                }
            }
        }

        Verdict::Reject(RejectReason::Malformed(
            "neither a category list nor a known error".to_string(),
        ))
    }
}

impl Default for ValidatorChain {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    pub endpoint_path: String,
    pub categories: Vec<PanelCategory>,
}

#[derive(Debug)]
enum ProbeState {
    Trying(usize),
    Accepted(Discovery),
    Exhausted,
}

pub struct EndpointProber {
    fetcher: Arc<dyn HttpFetch>,
    candidates: Vec<String>,
    chain: ValidatorChain,
}

impl EndpointProber {
    pub fn new(fetcher: Arc<dyn HttpFetch>, candidates: Vec<String>) -> Self {
        Self::with_chain(fetcher, candidates, ValidatorChain::standard())
    }

    pub fn with_chain(
        fetcher: Arc<dyn HttpFetch>,
        candidates: Vec<String>,
        chain: ValidatorChain,
    ) -> Self {
        let candidates = candidates
            .iter()
            .map(|c| normalize_endpoint_path(c))
            .collect();
        Self {
            fetcher,
            candidates,
            chain,
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Asks one path for the category list and judges the answer.
    pub async fn attempt(
        &self,
        credentials: &Credentials,
        endpoint_path: &str,
    ) -> Result<Vec<PanelCategory>, RejectReason> {
        let url = build_query(credentials, endpoint_path, &PanelAction::LiveCategories);
        let response = self
            .fetcher
            .fetch(&url)
            .await
            .map_err(|e| RejectReason::Transport(e.to_string()))?;

        match self.chain.evaluate(response.status, &response.body) {
            Verdict::Accept(categories) => Ok(categories),
            Verdict::Reject(reason) => Err(reason),
            Verdict::Inconclusive => Err(RejectReason::Malformed("undecided".to_string())),
        }
    }

    pub async fn discover(&self, credentials: &Credentials) -> SourceResult<Discovery> {
        let mut state = ProbeState::Trying(0);
        let mut saw_empty_list = false;

        loop {
            state = match state {
                ProbeState::Trying(i) if i >= self.candidates.len() => ProbeState::Exhausted,
                ProbeState::Trying(i) => {
                    let path = &self.candidates[i];
                    match self.attempt(credentials, path).await {
                        Ok(categories) => ProbeState::Accepted(Discovery {
                            endpoint_path: path.clone(),
                            categories,
                        }),
                        Err(reason) => {
                            debug!(
                                "Candidate {} rejected for {}: {}",
                                path, credentials.server, reason
                            );
                            saw_empty_list |= reason == RejectReason::EmptyList;
                            ProbeState::Trying(i + 1)
                        }
                    }
                }
                ProbeState::Accepted(discovery) => {
                    info!(
                        "Panel {} serves {} ({} categories)",
                        credentials.server,
                        discovery.endpoint_path,
                        discovery.categories.len()
                    );
                    return Ok(discovery);
                }
                ProbeState::Exhausted => {
                    return Err(if saw_empty_list {
                        SourceError::EmptyResult { what: "categories" }
                    } else {
                        SourceError::NoWorkingEndpoint {
                            server: credentials.server.clone(),
                        }
                    });
                }
            };
        }
    }
}
