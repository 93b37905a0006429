// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use iptv_source::{
    HttpFetch, HttpResponse, ManualClock, MemoryStore, SessionOptions, SourceError, SourceResult,
    SourceSession,
};

pub const SERVER: &str = "http://p.test";

#[derive(Debug, Clone)]
enum Reply {
    Respond {
        status: u16,
        body: String,
        delay: Duration,
    },
    Fail,
}

/// Scripted HTTP collaborator. Replies for a URL are consumed in order and
/// the last one repeats; unknown URLs get a 404.
#[derive(Default)]
pub struct FakeFetcher {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, url: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn on(&self, url: &str, status: u16, body: &str) {
        self.on_delayed(url, status, body, Duration::ZERO);
    }

    pub fn on_delayed(&self, url: &str, status: u16, body: &str, delay: Duration) {
        self.push(
            url,
            Reply::Respond {
                status,
                body: body.to_string(),
                delay,
            },
        );
    }

    pub fn fail(&self, url: &str) {
        self.push(url, Reply::Fail);
    }

    /// Drops every scripted reply for `url`.
    pub fn clear(&self, url: &str) {
        self.routes.lock().unwrap().remove(url);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl HttpFetch for FakeFetcher {
    async fn fetch(&self, url: &str) -> SourceResult<HttpResponse> {
        self.calls.lock().unwrap().push(url.to_string());

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Respond {
                status,
                body,
                delay,
            }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(HttpResponse::new(status, body))
            }
            Some(Reply::Fail) => Err(SourceError::Http {
                url: url.to_string(),
                message: "connection failed".to_string(),
            }),
            None => Ok(HttpResponse::new(404, "Not Found")),
        }
    }
}

pub fn panel_url(path: &str, action: &str) -> String {
    format!(
        "{}{}?username=u&password=p&action={}",
        SERVER, path, action
    )
}

pub fn categories_url(path: &str) -> String {
    panel_url(path, "get_live_categories")
}

pub fn streams_url(path: &str, category: Option<&str>) -> String {
    let base = panel_url(path, "get_live_streams");
    match category {
        Some(id) => format!("{}&category_id={}", base, id),
        None => base,
    }
}

pub const CATEGORIES: &str = r#"[
    {"category_id": "1", "category_name": "News", "parent_id": 0},
    {"category_id": "2", "category_name": "Sports", "parent_id": 0}
]"#;

pub const NEWS_STREAMS: &str = r#"[
    {"num": 1, "name": "World News", "stream_type": "live", "stream_id": 101,
     "stream_icon": "", "epg_channel_id": "world.news", "added": "1700000000",
     "category_id": "1", "direct_source": ""},
    {"num": 2, "name": "Business Today", "stream_type": "live", "stream_id": 102,
     "stream_icon": "", "epg_channel_id": null, "added": "1700100000",
     "category_id": "1", "direct_source": "http://cdn.test/business.ts"}
]"#;

pub const SPORTS_STREAMS: &str = r#"[
    {"num": 3, "name": "Sports One", "stream_type": "live", "stream_id": 201,
     "stream_icon": "", "added": "1690000000", "category_id": "2"}
]"#;

pub fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}

pub struct Harness {
    pub fetcher: Arc<FakeFetcher>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub session: SourceSession,
}

impl Harness {
    pub fn new() -> Self {
        let fetcher = FakeFetcher::new();
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let session = SourceSession::new(
            fetcher.clone(),
            store.clone(),
            clock.clone(),
            SessionOptions::default(),
        );
        Self {
            fetcher,
            store,
            clock,
            session,
        }
    }

    /// A panel that only answers on `/player_api.php`.
    pub fn with_panel() -> Self {
        let harness = Self::new();
        harness
            .fetcher
            .on(&categories_url("/player_api.php"), 200, CATEGORIES);
        harness
            .fetcher
            .on(&streams_url("/player_api.php", Some("1")), 200, NEWS_STREAMS);
        harness
            .fetcher
            .on(&streams_url("/player_api.php", Some("2")), 200, SPORTS_STREAMS);
        harness
    }

    /// A second session sharing this one's store and clock, as after a restart.
    pub fn reopen(&self) -> SourceSession {
        SourceSession::new(
            self.fetcher.clone(),
            self.store.clone(),
            self.clock.clone(),
            SessionOptions::default(),
        )
    }
}
