// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use super::probe::{Discovery, EndpointProber};
use super::query::{PanelAction, build_query};
use super::types::{EpgEntry, PanelCategory, PanelEpgResponse, PanelStream, extract_list};
use crate::error::{SourceError, SourceResult};
use crate::http::{HttpFetch, redact};
use crate::model::Credentials;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Read-only client for one panel account.
///
/// Calls go to the remembered endpoint path when there is one; if that
/// fails the candidate list is probed again once and the call is retried
/// on whatever path wins.
pub struct PanelClient {
    fetcher: Arc<dyn HttpFetch>,
    prober: EndpointProber,
    credentials: Credentials,
    endpoint: RwLock<Option<String>>,
}

impl PanelClient {
    pub fn new(fetcher: Arc<dyn HttpFetch>, candidates: Vec<String>, credentials: Credentials) -> Self {
        let endpoint = RwLock::new(credentials.api_endpoint_path.clone());
        Self {
            prober: EndpointProber::new(fetcher.clone(), candidates),
            fetcher,
            credentials,
            endpoint,
        }
    }

    /// Credentials including the endpoint path currently remembered.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            api_endpoint_path: self.endpoint_path(),
            ..self.credentials.clone()
        }
    }

    pub fn endpoint_path(&self) -> Option<String> {
        self.endpoint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn remember(&self, path: &str) {
        *self.endpoint.write().unwrap_or_else(PoisonError::into_inner) = Some(path.to_string());
    }

    /// Probes every candidate path and remembers the winner.
    pub async fn discover(&self) -> SourceResult<Discovery> {
        let discovery = self.prober.discover(&self.credentials).await?;
        self.remember(&discovery.endpoint_path);
        Ok(discovery)
    }

    pub async fn list_categories(&self) -> SourceResult<Vec<PanelCategory>> {
        if let Some(path) = self.endpoint_path() {
            match self.prober.attempt(&self.credentials, &path).await {
                Ok(categories) => return Ok(categories),
                Err(reason) => {
                    warn!("Remembered endpoint {} failed ({}), probing again", path, reason);
                }
            }
        }
        Ok(self.discover().await?.categories)
    }

    pub async fn list_streams(&self, category_id: Option<&str>) -> SourceResult<Vec<PanelStream>> {
        let action = PanelAction::LiveStreams {
            category_id: category_id.map(str::to_string),
        };
        self.request_list(&action).await
    }

    /// Short EPG for a stream. Never fails: any problem yields an empty list.
    /// Only the remembered endpoint is asked; a guide miss never re-probes.
    pub async fn list_epg(&self, stream_id: &str) -> Vec<EpgEntry> {
        let Some(path) = self.endpoint_path() else {
            debug!("No endpoint known yet, skipping EPG for stream {}", stream_id);
            return Vec::new();
        };
        let action = PanelAction::ShortEpg {
            stream_id: stream_id.to_string(),
        };
        match self.fetch_at::<PanelEpgResponse>(&path, &action, decode_object).await {
            Ok(response) => response.epg_listings.into_iter().map(EpgEntry::from).collect(),
            Err(e) => {
                debug!("EPG unavailable for stream {}: {}", stream_id, e);
                Vec::new()
            }
        }
    }

    async fn request_list<T: DeserializeOwned>(&self, action: &PanelAction) -> SourceResult<Vec<T>> {
        self.request(action, decode_list).await
    }

    async fn request<T>(
        &self,
        action: &PanelAction,
        decode: fn(&str) -> SourceResult<T>,
    ) -> SourceResult<T> {
        if let Some(path) = self.endpoint_path() {
            match self.fetch_at(&path, action, decode).await {
                Ok(value) => return Ok(value),
                Err(e) => warn!(
                    "{} on remembered endpoint {} failed ({}), probing again",
                    action.name(),
                    path,
                    e
                ),
            }
        }

        let discovery = self.discover().await?;
        self.fetch_at(&discovery.endpoint_path, action, decode).await
    }

    async fn fetch_at<T>(
        &self,
        path: &str,
        action: &PanelAction,
        decode: fn(&str) -> SourceResult<T>,
    ) -> SourceResult<T> {
        let url = build_query(&self.credentials, path, action);
        let response = self.fetcher.fetch(&url).await?;

        if response.status != 200 {
            return Err(SourceError::Status {
                url: redact(&url),
                status: response.status,
            });
        }

        decode(&response.body)
    }
}

fn parse_json(body: &str) -> SourceResult<Value> {
    let value: Value = serde_json::from_str(body.trim()).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        warn!("JSON parsing error: {} (body starts: {:?})", e, preview);
        SourceError::Decode(e.to_string())
    })?;

    if let Some(error) = value.as_object().and_then(|map| map.get("error")) {
        return Err(SourceError::Decode(format!("panel error: {}", error)));
    }

    Ok(value)
}

fn decode_list<T: DeserializeOwned>(body: &str) -> SourceResult<Vec<T>> {
    let value = parse_json(body)?;
    let items = extract_list(&value)
        .ok_or_else(|| SourceError::Decode("expected a JSON array".to_string()))?;

    // One odd record should not sink the whole list.
    let mut decoded = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<T>(item.clone()) {
            Ok(record) => decoded.push(record),
            Err(e) => debug!("Skipping unreadable record: {}", e),
        }
    }

    if decoded.is_empty() && !items.is_empty() {
        return Err(SourceError::Decode("no readable records in response".to_string()));
    }
    Ok(decoded)
}

fn decode_object<T: DeserializeOwned>(body: &str) -> SourceResult<T> {
    let value = parse_json(body)?;
    serde_json::from_value(value).map_err(|e| SourceError::Decode(e.to_string()))
}
