// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

//! Turning a channel's raw locator into something a player can open, and
//! deciding how to recover when playback fails.

use crate::error::{SourceError, SourceResult};
use crate::model::{Channel, Credentials, SourceKind};
use serde::Serialize;
use std::fmt;
use tracing::debug;
use url::Url;

/// Locator values panels use to mean "no direct source".
const FALSY_LOCATORS: [&str; 5] = ["0", "false", "null", "undefined", "none"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// HLS: manifest plus segments.
    Segmented,
    Progressive,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Segmented => write!(f, "segmented"),
            Self::Progressive => write!(f, "progressive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedStream {
    pub url: String,
    pub transport: Transport,
}

pub struct StreamResolver<'a> {
    source: SourceKind,
    credentials: Option<&'a Credentials>,
    base: Option<Url>,
}

impl<'a> StreamResolver<'a> {
    pub fn for_panel(credentials: &'a Credentials) -> Self {
        Self {
            source: SourceKind::Panel,
            credentials: Some(credentials),
            base: Url::parse(&credentials.server).ok(),
        }
    }

    /// Relative playlist locators resolve against the playlist's own URL.
    pub fn for_playlist(playlist_url: Option<&str>) -> Self {
        Self {
            source: SourceKind::Playlist,
            credentials: None,
            base: playlist_url.and_then(|u| Url::parse(u).ok()),
        }
    }

    pub fn resolve(&self, channel: &Channel) -> SourceResult<ResolvedStream> {
        let url = self.resolve_url(channel)?;
        let transport = self.transport_for(&url);
        debug!("Resolved channel {} as {} stream", channel.id, transport);
        Ok(ResolvedStream { url, transport })
    }

    fn resolve_url(&self, channel: &Channel) -> SourceResult<String> {
        let locator = channel
            .stream_locator
            .as_deref()
            .map(str::trim)
            .filter(|l| !is_falsy_locator(l));

        let Some(locator) = locator else {
            return self.canonical_url(channel);
        };

        if Url::parse(locator).is_ok_and(|u| u.has_host()) {
            return Ok(locator.to_string());
        }

        let base = self.base.as_ref().ok_or_else(|| {
            SourceError::InvalidUrl(format!(
                "relative locator '{}' for channel {} has no base URL",
                locator, channel.id
            ))
        })?;

        // "host:port/path" would otherwise parse as a scheme.
        let relative = if locator.starts_with('/') {
            locator.to_string()
        } else {
            format!("./{}", locator)
        };

        base.join(&relative)
            .map(|u| u.to_string())
            .map_err(|e| SourceError::InvalidUrl(format!("{}: {}", locator, e)))
    }

    /// `{base}/live/{username}/{password}/{streamId}.m3u8`
    fn canonical_url(&self, channel: &Channel) -> SourceResult<String> {
        let credentials = self.credentials.ok_or_else(|| {
            SourceError::InvalidUrl(format!("channel {} has no stream locator", channel.id))
        })?;

        Ok(format!(
            "{}/live/{}/{}/{}.m3u8",
            credentials.server.trim_end_matches('/'),
            credentials.username,
            credentials.password,
            channel.id
        ))
    }

    fn transport_for(&self, url: &str) -> Transport {
        if self.source == SourceKind::Playlist || is_segmented_url(url) {
            Transport::Segmented
        } else {
            Transport::Progressive
        }
    }
}

pub fn is_falsy_locator(locator: &str) -> bool {
    let trimmed = locator.trim();
    trimmed.is_empty()
        || FALSY_LOCATORS
            .iter()
            .any(|sentinel| trimmed.eq_ignore_ascii_case(sentinel))
}

pub fn is_segmented_url(url: &str) -> bool {
    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or(url).to_lowercase());
    path.ends_with(".m3u8") || path.ends_with(".m3u")
}

/// Fatal conditions reported by the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackFault {
    Network,
    Media,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackAction {
    ReloadManifest,
    RecoverMedia,
    SwitchToProgressive,
    GiveUp(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Segmented {
        network_retries: u32,
        media_recoveries: u32,
    },
    Progressive,
    Failed(String),
}

/// Segmented first; network faults reload, media faults recover in place,
/// anything else (or running out of retries) drops to progressive once.
/// A fault while progressive is final.
#[derive(Debug, Clone)]
pub struct PlaybackFallback {
    state: PlaybackState,
    max_network_retries: u32,
    max_media_recoveries: u32,
}

impl PlaybackFallback {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    pub fn new(transport: Transport) -> Self {
        Self::with_limits(
            transport,
            Self::DEFAULT_MAX_RETRIES,
            Self::DEFAULT_MAX_RETRIES,
        )
    }

    pub fn with_limits(transport: Transport, max_network_retries: u32, max_media_recoveries: u32) -> Self {
        let state = match transport {
            Transport::Segmented => PlaybackState::Segmented {
                network_retries: 0,
                media_recoveries: 0,
            },
            Transport::Progressive => PlaybackState::Progressive,
        };
        Self {
            state,
            max_network_retries,
            max_media_recoveries,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Transport to use for the next attempt, `None` once failed.
    pub fn transport(&self) -> Option<Transport> {
        match self.state {
            PlaybackState::Segmented { .. } => Some(Transport::Segmented),
            PlaybackState::Progressive => Some(Transport::Progressive),
            PlaybackState::Failed(_) => None,
        }
    }

    pub fn on_fault(&mut self, fault: PlaybackFault) -> PlaybackAction {
        let (next, action) = match (&self.state, fault) {
            (
                PlaybackState::Segmented {
                    network_retries,
                    media_recoveries,
                },
                PlaybackFault::Network,
            ) if *network_retries < self.max_network_retries => (
                PlaybackState::Segmented {
                    network_retries: network_retries + 1,
                    media_recoveries: *media_recoveries,
                },
                PlaybackAction::ReloadManifest,
            ),
            (
                PlaybackState::Segmented {
                    network_retries,
                    media_recoveries,
                },
                PlaybackFault::Media,
            ) if *media_recoveries < self.max_media_recoveries => (
                PlaybackState::Segmented {
                    network_retries: *network_retries,
                    media_recoveries: media_recoveries + 1,
                },
                PlaybackAction::RecoverMedia,
            ),
            (PlaybackState::Segmented { .. }, _) => {
                (PlaybackState::Progressive, PlaybackAction::SwitchToProgressive)
            }
            (PlaybackState::Progressive, fault) => {
                let reason = match fault {
                    PlaybackFault::Network => "network error".to_string(),
                    PlaybackFault::Media => "media error".to_string(),
                    PlaybackFault::Other(reason) => reason,
                };
                (
                    PlaybackState::Failed(reason.clone()),
                    PlaybackAction::GiveUp(reason),
                )
            }
            (PlaybackState::Failed(reason), _) => (
                PlaybackState::Failed(reason.clone()),
                PlaybackAction::GiveUp(reason.clone()),
            ),
        };

        self.state = next;
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("http://p.test", "u", "p").unwrap()
    }

    fn channel(id: &str, locator: Option<&str>) -> Channel {
        Channel {
            id: id.to_string(),
            name: format!("Channel {}", id),
            logo: None,
            category_id: "1".to_string(),
            stream_locator: locator.map(str::to_string),
            live: true,
            added: None,
            epg_channel_id: None,
        }
    }

    #[test]
    fn test_empty_locator_uses_canonical_url() {
        let creds = creds();
        let resolver = StreamResolver::for_panel(&creds);
        let resolved = resolver.resolve(&channel("42", Some(""))).unwrap();
        assert_eq!(resolved.url, "http://p.test/live/u/p/42.m3u8");
        assert_eq!(resolved.transport, Transport::Segmented);
    }

    #[test]
    fn test_falsy_sentinels() {
        let creds = creds();
        let resolver = StreamResolver::for_panel(&creds);
        for sentinel in [None, Some("0"), Some("false"), Some("FALSE"), Some(" null ")] {
            let resolved = resolver.resolve(&channel("7", sentinel)).unwrap();
            assert_eq!(resolved.url, "http://p.test/live/u/p/7.m3u8");
        }
    }

    #[test]
    fn test_absolute_locator_kept() {
        let creds = creds();
        let resolver = StreamResolver::for_panel(&creds);
        let resolved = resolver
            .resolve(&channel("1", Some("http://cdn.test/stream/1.ts")))
            .unwrap();
        assert_eq!(resolved.url, "http://cdn.test/stream/1.ts");
        assert_eq!(resolved.transport, Transport::Progressive);

        let resolved = resolver
            .resolve(&channel("1", Some("https://cdn.test/hls/index.M3U8?token=abc")))
            .unwrap();
        assert_eq!(resolved.transport, Transport::Segmented);
    }

    #[test]
    fn test_relative_locators() {
        let creds = creds();
        let resolver = StreamResolver::for_panel(&creds);
        assert_eq!(
            resolver.resolve(&channel("1", Some("/hls/1.m3u8"))).unwrap().url,
            "http://p.test/hls/1.m3u8"
        );
        assert_eq!(
            resolver.resolve(&channel("1", Some("streams/1.ts"))).unwrap().url,
            "http://p.test/streams/1.ts"
        );
    }

    #[test]
    fn test_playlist_streams_are_segmented() {
        let resolver = StreamResolver::for_playlist(Some("http://lists.test/tv/list.m3u"));
        let resolved = resolver.resolve(&channel("1", Some("http://x/1.ts"))).unwrap();
        assert_eq!(resolved.transport, Transport::Segmented);

        let resolved = resolver.resolve(&channel("2", Some("chan/2.ts"))).unwrap();
        assert_eq!(resolved.url, "http://lists.test/tv/chan/2.ts");

        assert!(resolver.resolve(&channel("3", Some("0"))).is_err());
    }

    #[test]
    fn test_absolute_locator_returned_verbatim() {
        let resolver = StreamResolver::for_playlist(Some("http://lists.test/tv/all.m3u"));
        for locator in [
            "http://cdn.test/live/My Channel.ts",
            "HTTP://CDN.TEST/live/1.ts",
            "rtmp://cdn.test:1935/app/stream",
        ] {
            let resolved = resolver.resolve(&channel("1", Some(locator))).unwrap();
            assert_eq!(resolved.url, locator);
        }
    }

    #[test]
    fn test_hostless_locator_is_joined() {
        let resolver = StreamResolver::for_playlist(Some("http://lists.test/tv/all.m3u"));
        let resolved = resolver
            .resolve(&channel("1", Some("cdn.test:8080/live/1.ts")))
            .unwrap();
        assert_eq!(resolved.url, "http://lists.test/tv/cdn.test:8080/live/1.ts");

        let resolved = resolver.resolve(&channel("2", Some("../up/2.ts"))).unwrap();
        assert_eq!(resolved.url, "http://lists.test/up/2.ts");

        let no_base = StreamResolver::for_playlist(None);
        assert!(no_base.resolve(&channel("3", Some("cdn.test:8080/live/3.ts"))).is_err());
    }

    #[test]
    fn test_fallback_other_fault_goes_progressive_once() {
        let mut fallback = PlaybackFallback::new(Transport::Segmented);
        assert_eq!(
            fallback.on_fault(PlaybackFault::Other("decoder crashed".into())),
            PlaybackAction::SwitchToProgressive
        );
        assert_eq!(fallback.transport(), Some(Transport::Progressive));
        assert_eq!(
            fallback.on_fault(PlaybackFault::Network),
            PlaybackAction::GiveUp("network error".to_string())
        );
        assert_eq!(fallback.transport(), None);
    }

    #[test]
    fn test_fallback_retries_are_bounded() {
        let mut fallback = PlaybackFallback::with_limits(Transport::Segmented, 2, 1);
        assert_eq!(fallback.on_fault(PlaybackFault::Network), PlaybackAction::ReloadManifest);
        assert_eq!(fallback.on_fault(PlaybackFault::Media), PlaybackAction::RecoverMedia);
        assert_eq!(fallback.on_fault(PlaybackFault::Network), PlaybackAction::ReloadManifest);
        assert_eq!(
            fallback.state(),
            &PlaybackState::Segmented {
                network_retries: 2,
                media_recoveries: 1
            }
        );
        assert_eq!(
            fallback.on_fault(PlaybackFault::Network),
            PlaybackAction::SwitchToProgressive
        );
    }

    #[test]
    fn test_progressive_start_fails_directly() {
        let mut fallback = PlaybackFallback::new(Transport::Progressive);
        assert_eq!(
            fallback.on_fault(PlaybackFault::Media),
            PlaybackAction::GiveUp("media error".to_string())
        );
    }
}
