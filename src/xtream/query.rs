// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::model::{Credentials, normalize_filter};

pub const ACTION_GET_LIVE_CATEGORIES: &str = "get_live_categories";
pub const ACTION_GET_LIVE_STREAMS: &str = "get_live_streams";
pub const ACTION_GET_SHORT_EPG: &str = "get_short_epg";

/// Candidate API paths, most common convention first.
pub const DEFAULT_CANDIDATE_PATHS: [&str; 3] = ["/player_api.php", "/panel_api.php", "/api.php"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelAction {
    LiveCategories,
    LiveStreams { category_id: Option<String> },
    ShortEpg { stream_id: String },
}

impl PanelAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LiveCategories => ACTION_GET_LIVE_CATEGORIES,
            Self::LiveStreams { .. } => ACTION_GET_LIVE_STREAMS,
            Self::ShortEpg { .. } => ACTION_GET_SHORT_EPG,
        }
    }
}

/// Ensures a single leading slash, e.g. `player_api.php` -> `/player_api.php`.
pub fn normalize_endpoint_path(path: &str) -> String {
    format!("/{}", path.trim().trim_start_matches('/'))
}

/// `{base}{path}?username={u}&password={p}&action={a}[&category_id=..][&stream_id=..]`
pub fn build_query(credentials: &Credentials, endpoint_path: &str, action: &PanelAction) -> String {
    let mut url = format!(
        "{}{}?username={}&password={}&action={}",
        credentials.server.trim_end_matches('/'),
        normalize_endpoint_path(endpoint_path),
        credentials.username,
        credentials.password,
        action.name()
    );

    match action {
        PanelAction::LiveCategories => {}
        PanelAction::LiveStreams { category_id } => {
            if let Some(id) = normalize_filter(category_id.as_deref()) {
                url.push_str(&format!("&category_id={}", id));
            }
        }
        PanelAction::ShortEpg { stream_id } => {
            url.push_str(&format!("&stream_id={}", stream_id));
        }
    }

    url
}
