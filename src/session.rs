// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

//! One query surface over whichever source is active.
//!
//! A panel source goes through the TTL cache and the panel client; a
//! playlist source is parsed once when selected and served from memory.
//! Selecting a source replaces the previous one completely, and the
//! selection is persisted so the last-selected source is the one restored.

use crate::cache::{CacheKey, CacheKind, CacheManager, CooldownGuard, DEFAULT_COOLDOWN, DEFAULT_TTL};
use crate::clock::Clock;
use crate::error::{SourceError, SourceResult};
use crate::http::{HttpFetch, redact};
use crate::m3u::{self, PlaylistEntry};
use crate::model::{
    Category, Channel, Credentials, GENERAL_CATEGORY, SortOrder, SourceKind, normalize_filter,
    search_channels, sort_channels,
};
use crate::resolver::{ResolvedStream, StreamResolver};
use crate::store::{KEY_ACTIVE_SOURCE, KEY_CREDENTIALS, KEY_PLAYLIST, SessionStore};
use crate::xtream::query::DEFAULT_CANDIDATE_PATHS;
use crate::xtream::{EpgEntry, PanelCategory, PanelClient, PanelStream};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub candidate_paths: Vec<String>,
    pub ttl: Duration,
    pub cooldown: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            candidate_paths: DEFAULT_CANDIDATE_PATHS.iter().map(|p| p.to_string()).collect(),
            ttl: DEFAULT_TTL,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SourceSelection {
    Panel(Credentials),
    /// An `http(s)://` URL or a local file path.
    Playlist { location: String },
    /// Playlist text already in hand; `origin` is used to resolve relative locators.
    PlaylistText { origin: Option<String>, text: String },
}

struct LoadedPlaylist {
    origin: Option<String>,
    channels: Vec<Channel>,
    categories: Vec<Category>,
    epg_url: Option<String>,
}

enum ActiveSource {
    Panel(PanelClient),
    Playlist(LoadedPlaylist),
}

impl ActiveSource {
    fn kind(&self) -> SourceKind {
        match self {
            Self::Panel(_) => SourceKind::Panel,
            Self::Playlist(_) => SourceKind::Playlist,
        }
    }
}

/// The channel list currently on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelView {
    pub source: SourceKind,
    pub category: Option<String>,
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    Applied(usize),
    /// A newer request for the same view was issued; this result was dropped.
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    pub removed_entries: usize,
    pub categories: usize,
}

#[derive(Debug)]
struct RequestTicket {
    slot: String,
    generation: u64,
    epoch: u64,
}

pub struct SourceSession {
    fetcher: Arc<dyn HttpFetch>,
    store: Arc<dyn SessionStore>,
    cache: CacheManager,
    cooldown: CooldownGuard,
    options: SessionOptions,
    active: RwLock<Option<Arc<ActiveSource>>>,
    epoch: AtomicU64,
    generations: Mutex<HashMap<String, u64>>,
    view: RwLock<Option<ChannelView>>,
}

impl SourceSession {
    pub fn new(
        fetcher: Arc<dyn HttpFetch>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        options: SessionOptions,
    ) -> Self {
        Self {
            cache: CacheManager::new(store.clone(), clock.clone(), options.ttl),
            cooldown: CooldownGuard::new(store.clone(), clock, options.cooldown),
            fetcher,
            store,
            options,
            active: RwLock::new(None),
            epoch: AtomicU64::new(0),
            generations: Mutex::new(HashMap::new()),
            view: RwLock::new(None),
        }
    }

    pub fn active_kind(&self) -> Option<SourceKind> {
        self.current().map(|a| a.kind())
    }

    /// Panel credentials, with the endpoint path as currently known.
    pub fn credentials(&self) -> Option<Credentials> {
        match self.current()?.as_ref() {
            ActiveSource::Panel(client) => Some(client.credentials()),
            ActiveSource::Playlist(_) => None,
        }
    }

    pub fn playlist_epg_url(&self) -> Option<String> {
        match self.current()?.as_ref() {
            ActiveSource::Playlist(playlist) => playlist.epg_url.clone(),
            ActiveSource::Panel(_) => None,
        }
    }

    /// Switches to `selection`. The previous source stays active if this fails.
    pub async fn select_source(&self, selection: SourceSelection) -> SourceResult<SourceKind> {
        match selection {
            SourceSelection::Panel(credentials) => self.select_panel(credentials).await,
            SourceSelection::Playlist { location } => {
                let text = self.load_playlist_text(&location).await?;
                let playlist = build_playlist(Some(location.clone()), &text)?;
                self.activate(ActiveSource::Playlist(playlist));
                self.persist_playlist(Some(location.as_str()))?;
                Ok(SourceKind::Playlist)
            }
            SourceSelection::PlaylistText { origin, text } => {
                let playlist = build_playlist(origin, &text)?;
                self.activate(ActiveSource::Playlist(playlist));
                self.persist_playlist(None)?;
                Ok(SourceKind::Playlist)
            }
        }
    }

    async fn select_panel(&self, credentials: Credentials) -> SourceResult<SourceKind> {
        let client = PanelClient::new(
            self.fetcher.clone(),
            self.options.candidate_paths.clone(),
            credentials,
        );

        if client.endpoint_path().is_none() {
            let discovery = client.discover().await?;
            let key = CacheKey::for_panel(&client.credentials(), CacheKind::Categories, None);
            if let Err(e) = self.cache.put(&key, &discovery.categories) {
                warn!("Failed to cache categories from discovery: {}", e);
            }
        }

        let credentials = client.credentials();
        info!("Using panel {}", credentials.display_name());
        self.activate(ActiveSource::Panel(client));

        self.store.remove(KEY_PLAYLIST)?;
        self.store.set(KEY_CREDENTIALS, encode_credentials(&credentials)?)?;
        self.store
            .set(KEY_ACTIVE_SOURCE, SourceKind::Panel.as_str().to_string())?;
        Ok(SourceKind::Panel)
    }

    /// Re-selects whatever source was selected last, if any.
    pub async fn restore(&self) -> SourceResult<Option<SourceKind>> {
        let Some(kind) = self.store.get(KEY_ACTIVE_SOURCE) else {
            return Ok(None);
        };

        let selection = match kind.parse::<SourceKind>()? {
            SourceKind::Panel => {
                let Some(raw) = self.store.get(KEY_CREDENTIALS) else {
                    return Ok(None);
                };
                let credentials: Credentials = serde_json::from_str(&raw)
                    .map_err(|e| SourceError::Store(format!("stored credentials: {}", e)))?;
                SourceSelection::Panel(credentials)
            }
            SourceKind::Playlist => {
                let Some(location) = self.store.get(KEY_PLAYLIST) else {
                    return Ok(None);
                };
                SourceSelection::Playlist { location }
            }
        };

        self.select_source(selection).await.map(Some)
    }

    /// Forgets the active source and everything persisted about it except cache and cooldown.
    pub fn logout(&self) -> SourceResult<()> {
        self.deactivate();
        self.store.remove(KEY_CREDENTIALS)?;
        self.store.remove(KEY_PLAYLIST)?;
        self.store.remove(KEY_ACTIVE_SOURCE)?;
        Ok(())
    }

    pub async fn list_categories(&self) -> SourceResult<Vec<Category>> {
        let active = self.require_active()?;
        match active.as_ref() {
            ActiveSource::Playlist(playlist) => Ok(playlist.categories.clone()),
            ActiveSource::Panel(client) => {
                let key = CacheKey::for_panel(&client.credentials(), CacheKind::Categories, None);
                let raw = match self.cache.get::<Vec<PanelCategory>>(&key) {
                    Some(cached) => {
                        debug!("Categories served from cache");
                        cached
                    }
                    None => {
                        let fresh = client.list_categories().await?;
                        self.sync_credentials(client);
                        if fresh.is_empty() {
                            return Err(SourceError::EmptyResult { what: "categories" });
                        }
                        if let Err(e) = self.cache.put(&key, &fresh) {
                            warn!("Failed to cache categories: {}", e);
                        }
                        fresh
                    }
                };
                Ok(raw.into_iter().map(category_from_panel).collect())
            }
        }
    }

    pub async fn list_channels(
        &self,
        category: Option<&str>,
        order: SortOrder,
    ) -> SourceResult<Vec<Channel>> {
        let active = self.require_active()?;
        let filter = normalize_filter(category);

        let mut channels = match active.as_ref() {
            ActiveSource::Playlist(playlist) => playlist
                .channels
                .iter()
                .filter(|c| filter.is_none_or(|id| c.category_id == id))
                .cloned()
                .collect(),
            ActiveSource::Panel(client) => self.panel_channels(client, filter).await?,
        };

        sort_channels(&mut channels, order);
        Ok(channels)
    }

    async fn panel_channels(&self, client: &PanelClient, filter: Option<&str>) -> SourceResult<Vec<Channel>> {
        let key = CacheKey::for_panel(
            &client.credentials(),
            CacheKind::Streams,
            Some(filter.unwrap_or("all")),
        );

        let streams = match self.cache.get::<Vec<PanelStream>>(&key) {
            Some(cached) => {
                debug!("Streams for {} served from cache", filter.unwrap_or("all"));
                cached
            }
            None => {
                let mut fresh = client.list_streams(filter).await?;
                self.sync_credentials(client);

                // Some panels ignore category_id and send everything.
                if let Some(id) = filter {
                    fresh.retain(|s| s.category_id.as_deref().is_none_or(|c| c == id));
                }
                if fresh.is_empty() {
                    return Err(SourceError::EmptyResult { what: "channels" });
                }
                if let Err(e) = self.cache.put(&key, &fresh) {
                    warn!("Failed to cache streams: {}", e);
                }
                fresh
            }
        };

        Ok(streams.into_iter().map(channel_from_panel).collect())
    }

    /// Name search within the (optionally filtered) channel list.
    pub async fn search(
        &self,
        query: &str,
        category: Option<&str>,
        order: SortOrder,
    ) -> SourceResult<Vec<Channel>> {
        let channels = self.list_channels(category, order).await?;
        Ok(search_channels(channels, query))
    }

    /// Loads a category into the on-screen view. If another call starts
    /// before this one finishes, this one's result is discarded.
    pub async fn select_category(
        &self,
        category: Option<&str>,
        order: SortOrder,
    ) -> SourceResult<ViewUpdate> {
        let ticket = self.issue_ticket("channels");
        let result = self.list_channels(category, order).await;

        if !self.is_current(&ticket) {
            debug!(
                "Dropping superseded result for {:?} (generation {})",
                category, ticket.generation
            );
            return Ok(ViewUpdate::Superseded);
        }

        let channels = result?;
        let count = channels.len();
        let source = self.active_kind().ok_or(SourceError::NoActiveSource)?;
        *self.view.write().unwrap_or_else(PoisonError::into_inner) = Some(ChannelView {
            source,
            category: normalize_filter(category).map(str::to_string),
            channels,
        });
        Ok(ViewUpdate::Applied(count))
    }

    pub fn view(&self) -> Option<ChannelView> {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn find_channel(&self, channel_id: &str) -> SourceResult<Channel> {
        self.list_channels(None, SortOrder::Provider)
            .await?
            .into_iter()
            .find(|c| c.id == channel_id)
            .ok_or_else(|| SourceError::ChannelNotFound(channel_id.to_string()))
    }

    /// Best effort; playlist sources have no short EPG.
    pub async fn list_epg(&self, channel_id: &str) -> Vec<EpgEntry> {
        let Some(active) = self.current() else {
            return Vec::new();
        };
        match active.as_ref() {
            ActiveSource::Panel(client) => client.list_epg(channel_id).await,
            ActiveSource::Playlist(_) => Vec::new(),
        }
    }

    pub fn resolve(&self, channel: &Channel) -> SourceResult<ResolvedStream> {
        let active = self.require_active()?;
        match active.as_ref() {
            ActiveSource::Panel(client) => {
                let credentials = client.credentials();
                StreamResolver::for_panel(&credentials).resolve(channel)
            }
            ActiveSource::Playlist(playlist) => {
                StreamResolver::for_playlist(playlist.origin.as_deref()).resolve(channel)
            }
        }
    }

    /// Time left before [`force_refresh`](Self::force_refresh) is allowed.
    pub fn refresh_cooldown(&self) -> Option<Duration> {
        let credentials = self.credentials()?;
        self.cooldown.remaining(&credentials.identity())
    }

    /// Drops every cached entry of the active panel account.
    ///
    /// Rejected without network traffic while the cooldown runs. Fresh
    /// categories are fetched before anything is removed, so a failed
    /// refresh leaves the old cache in place and does not start the cooldown.
    /// For a playlist source the playlist is loaded again.
    pub async fn force_refresh(&self) -> SourceResult<RefreshOutcome> {
        let active = self.require_active()?;
        match active.as_ref() {
            ActiveSource::Panel(client) => {
                let credentials = client.credentials();
                let identity = credentials.identity();
                self.cooldown.can_reset(&identity)?;

                let fresh = client.list_categories().await?;
                self.sync_credentials(client);
                if fresh.is_empty() {
                    return Err(SourceError::EmptyResult { what: "categories" });
                }

                let removed = self
                    .cache
                    .invalidate(&CacheKey::prefix(SourceKind::Panel, &identity))?;
                self.cache.put(
                    &CacheKey::for_panel(&credentials, CacheKind::Categories, None),
                    &fresh,
                )?;
                self.cooldown.mark_reset(&identity)?;

                info!("Refreshed {}: {} cache keys dropped", credentials.display_name(), removed);
                Ok(RefreshOutcome {
                    removed_entries: removed,
                    categories: fresh.len(),
                })
            }
            ActiveSource::Playlist(playlist) => {
                let Some(location) = playlist.origin.clone() else {
                    return Ok(RefreshOutcome {
                        removed_entries: 0,
                        categories: playlist.categories.len(),
                    });
                };
                let text = self.load_playlist_text(&location).await?;
                let reloaded = build_playlist(Some(location), &text)?;
                let categories = reloaded.categories.len();
                self.activate(ActiveSource::Playlist(reloaded));
                Ok(RefreshOutcome {
                    removed_entries: 0,
                    categories,
                })
            }
        }
    }

    async fn load_playlist_text(&self, location: &str) -> SourceResult<String> {
        let location = location.trim();
        if location.starts_with("http://") || location.starts_with("https://") {
            let response = self.fetcher.fetch(location).await?;
            if response.status != 200 {
                return Err(SourceError::Status {
                    url: redact(location),
                    status: response.status,
                });
            }
            Ok(response.body)
        } else {
            tokio::fs::read_to_string(location).await.map_err(|e| SourceError::Http {
                url: redact(location),
                message: format!("failed to read playlist file: {}", e),
            })
        }
    }

    fn persist_playlist(&self, location: Option<&str>) -> SourceResult<()> {
        self.store.remove(KEY_CREDENTIALS)?;
        match location {
            Some(location) => self.store.set(KEY_PLAYLIST, location.to_string())?,
            None => self.store.remove(KEY_PLAYLIST)?,
        }
        self.store
            .set(KEY_ACTIVE_SOURCE, SourceKind::Playlist.as_str().to_string())
    }

    /// Persists the endpoint path if re-probing moved it.
    fn sync_credentials(&self, client: &PanelClient) {
        let credentials = client.credentials();
        let stored = self
            .store
            .get(KEY_CREDENTIALS)
            .and_then(|raw| serde_json::from_str::<Credentials>(&raw).ok());

        let is_same_account = stored.as_ref().is_some_and(|s| {
            s.server == credentials.server && s.username == credentials.username
        });
        let unchanged = stored
            .as_ref()
            .is_some_and(|s| s.api_endpoint_path == credentials.api_endpoint_path);

        if is_same_account && !unchanged {
            let result = encode_credentials(&credentials)
                .and_then(|encoded| self.store.set(KEY_CREDENTIALS, encoded));
            if let Err(e) = result {
                warn!("Failed to remember endpoint path: {}", e);
            }
        }
    }

    fn current(&self) -> Option<Arc<ActiveSource>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn require_active(&self) -> SourceResult<Arc<ActiveSource>> {
        self.current().ok_or(SourceError::NoActiveSource)
    }

    fn activate(&self, source: ActiveSource) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *self.view.write().unwrap_or_else(PoisonError::into_inner) = None;
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(source));
    }

    fn deactivate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *self.view.write().unwrap_or_else(PoisonError::into_inner) = None;
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn issue_ticket(&self, slot: &str) -> RequestTicket {
        let mut generations = self
            .generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let generation = generations.entry(slot.to_string()).or_insert(0);
        *generation += 1;
        RequestTicket {
            slot: slot.to_string(),
            generation: *generation,
            epoch: self.epoch.load(Ordering::SeqCst),
        }
    }

    fn is_current(&self, ticket: &RequestTicket) -> bool {
        let generations = self
            .generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        generations.get(&ticket.slot) == Some(&ticket.generation)
            && self.epoch.load(Ordering::SeqCst) == ticket.epoch
    }
}

fn encode_credentials(credentials: &Credentials) -> SourceResult<String> {
    serde_json::to_string(credentials)
        .map_err(|e| SourceError::Store(format!("failed to serialize credentials: {}", e)))
}

fn build_playlist(origin: Option<String>, text: &str) -> SourceResult<LoadedPlaylist> {
    let parsed = m3u::parse_playlist(text);
    if parsed.entries.is_empty() {
        return Err(SourceError::EmptyResult { what: "channels" });
    }

    let channels: Vec<Channel> = parsed
        .entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| channel_from_entry(index, entry))
        .collect();
    let categories = categories_from_channels(&channels);

    info!(
        "Loaded playlist with {} channels in {} groups",
        channels.len(),
        categories.len()
    );

    Ok(LoadedPlaylist {
        origin,
        channels,
        categories,
        epg_url: parsed.epg_url,
    })
}

pub fn category_from_panel(category: PanelCategory) -> Category {
    Category {
        id: category.category_id,
        name: category.category_name,
        parent_id: category.parent_id,
    }
}

pub fn channel_from_panel(stream: PanelStream) -> Channel {
    Channel {
        live: stream
            .stream_type
            .as_deref()
            .is_none_or(|t| t.eq_ignore_ascii_case("live")),
        added: stream.added_at(),
        stream_locator: stream.direct_source_text(),
        id: stream.stream_id,
        name: stream.name,
        logo: stream.stream_icon,
        category_id: stream.category_id.unwrap_or_default(),
        epg_channel_id: stream.epg_channel_id,
    }
}

/// Playlist channels are numbered by position, starting at 1.
pub fn channel_from_entry(index: usize, entry: PlaylistEntry) -> Channel {
    Channel {
        id: (index + 1).to_string(),
        name: entry.name,
        logo: entry.tvg_logo,
        category_id: entry
            .group_title
            .filter(|g| !g.trim().is_empty())
            .unwrap_or_else(|| GENERAL_CATEGORY.to_string()),
        stream_locator: Some(entry.url),
        live: true,
        added: None,
        epg_channel_id: entry.tvg_id,
    }
}

/// One category per distinct group, in order of first appearance.
pub fn categories_from_channels(channels: &[Channel]) -> Vec<Category> {
    let mut seen = HashSet::new();
    channels
        .iter()
        .filter(|c| seen.insert(c.category_id.clone()))
        .map(|c| Category {
            id: c.category_id.clone(),
            name: c.category_id.clone(),
            parent_id: None,
        })
        .collect()
}

/// The inverse of `channel_from_entry`, for exporting channels as M3U.
pub fn channel_to_entry(channel: &Channel, url: String) -> PlaylistEntry {
    PlaylistEntry {
        duration: "-1".to_string(),
        name: channel.name.clone(),
        url,
        tvg_id: channel.epg_channel_id.clone(),
        tvg_name: None,
        tvg_logo: channel.logo.clone().filter(|l| !l.is_empty()),
        group_title: Some(channel.category_id.clone()).filter(|g| !g.is_empty()),
    }
}
