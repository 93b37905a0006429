// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// Panels disagree on whether ids are strings or numbers.
fn deserialize_number_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value: Value = Deserialize::deserialize(deserializer)?;

    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(D::Error::custom("Expected string or number")),
    }
}

fn deserialize_optional_number_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Value = Deserialize::deserialize(deserializer)?;

    Ok(match value {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelCategory {
    #[serde(deserialize_with = "deserialize_number_as_string")]
    pub category_id: String,
    #[serde(default)]
    pub category_name: String,
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelStream {
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub num: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub stream_type: Option<String>,
    #[serde(deserialize_with = "deserialize_number_as_string")]
    pub stream_id: String,
    #[serde(default)]
    pub stream_icon: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub epg_channel_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub added: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub direct_source: Option<Value>,
    #[serde(default)]
    pub tv_archive: Option<Value>,
}

impl PanelStream {
    /// `added` is a unix timestamp in seconds, sent as string or number.
    pub fn added_at(&self) -> Option<DateTime<Utc>> {
        let secs: i64 = self.added.as_deref()?.trim().parse().ok()?;
        Utc.timestamp_opt(secs, 0).single()
    }

    /// `direct_source` as text; panels also send `false`, `0` or `null` here.
    pub fn direct_source_text(&self) -> Option<String> {
        match self.direct_source.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelEpgListing {
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub start_timestamp: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub stop_timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelEpgResponse {
    #[serde(default)]
    pub epg_listings: Vec<PanelEpgListing>,
}

/// One programme from the short EPG, with text already decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpgEntry {
    pub title: String,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub stop: Option<DateTime<Utc>>,
}

impl From<PanelEpgListing> for EpgEntry {
    fn from(listing: PanelEpgListing) -> Self {
        let start = parse_epg_time(listing.start_timestamp.as_deref(), listing.start.as_deref());
        let stop = parse_epg_time(listing.stop_timestamp.as_deref(), listing.end.as_deref());

        Self {
            title: decode_epg_text(&listing.title),
            description: listing
                .description
                .as_deref()
                .map(decode_epg_text)
                .filter(|d| !d.is_empty()),
            start,
            stop,
        }
    }
}

fn parse_epg_time(timestamp: Option<&str>, formatted: Option<&str>) -> Option<DateTime<Utc>> {
    if let Some(secs) = timestamp.and_then(|t| t.trim().parse::<i64>().ok()) {
        return Utc.timestamp_opt(secs, 0).single();
    }
    let formatted = formatted?.trim();
    NaiveDateTime::parse_from_str(formatted, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Panels usually base64-encode EPG text; plain text is passed through.
pub fn decode_epg_text(raw: &str) -> String {
    let trimmed = raw.trim();
    STANDARD
        .decode(trimmed)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .filter(|text| !text.chars().any(|c| c.is_control() && c != '\n' && c != '\t'))
        .unwrap_or_else(|| trimmed.to_string())
}

/// The list inside a panel response: a bare array or `{"result": [...]}`.
pub fn extract_list(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.get("result").and_then(Value::as_array),
        _ => None,
    }
}
