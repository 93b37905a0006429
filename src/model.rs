// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::error::{SourceError, SourceResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Category id used for playlist channels without a `group-title`.
pub const GENERAL_CATEGORY: &str = "General";

/// Login details for a panel source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub server: String,
    #[serde(default)]
    pub name: Option<String>,
    pub username: String,
    pub password: String,
    /// Endpoint path the panel was found to serve, e.g. `/player_api.php`.
    #[serde(default)]
    pub api_endpoint_path: Option<String>,
}

impl Credentials {
    /// Builds credentials from whatever the user typed as the server URL.
    ///
    /// Only scheme, host and port are kept, so pasting a full
    /// `http://host:8080/player_api.php?...` link works.
    pub fn new(server_url: &str, username: &str, password: &str) -> SourceResult<Self> {
        let url = url::Url::parse(server_url.trim())
            .map_err(|e| SourceError::InvalidUrl(format!("{}: {}", server_url, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(SourceError::InvalidUrl(format!(
                "{}: server must use http or https",
                server_url
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| SourceError::InvalidUrl(format!("{}: missing host", server_url)))?;

        let server = if let Some(port) = url.port() {
            format!("{}://{}:{}", url.scheme(), host, port)
        } else {
            format!("{}://{}", url.scheme(), host)
        };

        Ok(Self {
            server,
            name: None,
            username: username.to_string(),
            password: password.to_string(),
            api_endpoint_path: None,
        })
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name.filter(|n| !n.trim().is_empty());
        self
    }

    /// Stable short id for this (server, username) pair.
    ///
    /// Used in cache and cooldown keys so passwords never end up in them.
    pub fn identity(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.server.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.username.as_bytes());
        format!("{:x}", hasher.finalize())[..16].to_string()
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}@{}", self.username, self.server))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Panel,
    Playlist,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Panel => "panel",
            Self::Playlist => "playlist",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "panel" => Ok(Self::Panel),
            "playlist" => Ok(Self::Playlist),
            other => Err(SourceError::Store(format!("unknown source kind '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A live channel in the shape shared by both source kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub logo: Option<String>,
    pub category_id: String,
    /// Locator exactly as the source gave it; see `resolver` for the playable URL.
    pub stream_locator: Option<String>,
    pub live: bool,
    pub added: Option<DateTime<Utc>>,
    pub epg_channel_id: Option<String>,
}

/// Whether a category filter value means "no filter".
pub fn is_all_categories(category_id: &str) -> bool {
    matches!(category_id.trim(), "" | "all" | "ALL" | "All" | "*" | "0")
}

/// Drops "all" sentinels so callers can treat `None` as unfiltered.
pub fn normalize_filter(category_id: Option<&str>) -> Option<&str> {
    category_id.filter(|id| !is_all_categories(id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// As returned by the source.
    #[default]
    Provider,
    Alphabetical,
    RecentlyAdded,
}

impl FromStr for SortOrder {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "provider" | "default" => Ok(Self::Provider),
            "name" | "alpha" | "alphabetical" => Ok(Self::Alphabetical),
            "recent" | "added" | "recently-added" => Ok(Self::RecentlyAdded),
            other => Err(SourceError::Decode(format!(
                "invalid sort order '{}', use 'provider', 'name' or 'recent'",
                other
            ))),
        }
    }
}

pub fn sort_channels(channels: &mut [Channel], order: SortOrder) {
    match order {
        SortOrder::Provider => {}
        SortOrder::Alphabetical => {
            channels.sort_by_cached_key(|c| c.name.to_lowercase());
        }
        // `None` sorts as oldest
        SortOrder::RecentlyAdded => {
            channels.sort_by(|a, b| b.added.cmp(&a.added));
        }
    }
}

/// Case-insensitive substring match on the display name.
pub fn search_channels(channels: Vec<Channel>, query: &str) -> Vec<Channel> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return channels;
    }
    channels
        .into_iter()
        .filter(|c| c.name.to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn channel(name: &str, added: Option<i64>) -> Channel {
        Channel {
            id: name.to_string(),
            name: name.to_string(),
            logo: None,
            category_id: "1".to_string(),
            stream_locator: None,
            live: true,
            added: added.map(|ts| Utc.timestamp_opt(ts, 0).unwrap()),
            epg_channel_id: None,
        }
    }

    #[test]
    fn test_credentials_strip_path() {
        let creds =
            Credentials::new("http://panel.example:8080/player_api.php?x=1", "u", "p").unwrap();
        assert_eq!(creds.server, "http://panel.example:8080");

        let creds = Credentials::new("https://panel.example/", "u", "p").unwrap();
        assert_eq!(creds.server, "https://panel.example");
    }

    #[test]
    fn test_credentials_reject_bad_urls() {
        assert!(Credentials::new("panel.example", "u", "p").is_err());
        assert!(Credentials::new("ftp://panel.example", "u", "p").is_err());
    }

    #[test]
    fn test_identity_ignores_password() {
        let a = Credentials::new("http://p.test", "u", "one").unwrap();
        let b = Credentials::new("http://p.test", "u", "two").unwrap();
        let c = Credentials::new("http://p.test", "v", "one").unwrap();
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
        assert_eq!(a.identity().len(), 16);
    }

    #[test]
    fn test_all_sentinels() {
        assert_eq!(normalize_filter(Some("all")), None);
        assert_eq!(normalize_filter(Some("")), None);
        assert_eq!(normalize_filter(Some("0")), None);
        assert_eq!(normalize_filter(Some("12")), Some("12"));
        assert_eq!(normalize_filter(None), None);
    }

    #[test]
    fn test_sort_recently_added_puts_missing_last() {
        let mut channels = vec![
            channel("b", None),
            channel("a", Some(100)),
            channel("c", Some(300)),
        ];
        sort_channels(&mut channels, SortOrder::RecentlyAdded);
        let names: Vec<_> = channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_sort_alphabetical_is_case_insensitive() {
        let mut channels = vec![channel("beta", None), channel("Alpha", None), channel("gamma", None)];
        sort_channels(&mut channels, SortOrder::Alphabetical);
        let names: Vec<_> = channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_search_matches_name_only() {
        let mut with_group = channel("BBC One", None);
        with_group.category_id = "news".to_string();
        let channels = vec![with_group, channel("CNN", None)];

        let found = search_channels(channels.clone(), "bbc");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "BBC One");

        assert!(search_channels(channels, "news").is_empty());
    }
}
