// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use iptv_source::{
    Config, FileStore, ProxyFetcher, SourceKind, SourceSession, SystemClock,
};

pub mod cache;
pub mod list;
pub mod login;
pub mod play;
pub mod search;
pub mod status;

pub use cache::RefreshCommand;
pub use list::{CategoriesCommand, ChannelsCommand, EpgCommand};
pub use login::{LoginCommand, PlaylistCommand};
pub use play::PlayCommand;
pub use search::SearchCommand;
pub use status::{LogoutCommand, StatusCommand};

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    M3u,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "m3u" => Ok(Self::M3u),
            _ => anyhow::bail!("Invalid format: {}. Use 'text', 'json', or 'm3u'", s),
        }
    }
}

/// Everything a command needs: configuration plus a session backed by the state file.
pub struct CommandContext {
    pub config: Config,
    pub session: SourceSession,
    pub state_path: PathBuf,
}

impl CommandContext {
    pub fn open(config: Config) -> Result<Self> {
        let fetcher = ProxyFetcher::new(config.proxy.url.as_deref(), config.request_timeout())?;
        let state_path = FileStore::default_path()?;
        let store = FileStore::open(&state_path)?;

        let session = SourceSession::new(
            Arc::new(fetcher),
            Arc::new(store),
            Arc::new(SystemClock),
            config.session_options(),
        );

        Ok(Self {
            config,
            session,
            state_path,
        })
    }

    /// Re-selects the last used source, failing if there is none.
    pub async fn require_source(&self) -> Result<SourceKind> {
        let pb = spinner("Connecting...");
        let restored = self.session.restore().await;
        pb.finish_and_clear();

        match restored? {
            Some(kind) => Ok(kind),
            None => anyhow::bail!(
                "No source selected. Run 'iptv-source login' or 'iptv-source playlist <url>' first."
            ),
        }
    }
}

pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠁", "⠂", "⠄", "⡀", "⢀", "⠠", "⠐", "⠈"]),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
