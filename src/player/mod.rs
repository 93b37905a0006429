// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

//! Hands resolved streams to an external player process and walks the
//! playback fallback state machine on failure.

use crate::config::PlayerConfig;
use crate::resolver::{PlaybackAction, PlaybackFallback, PlaybackFault, ResolvedStream, Transport};
use anyhow::{Context, Result};
use std::future::Future;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// How a finished playback attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished { transport: Transport, attempts: u32 },
}

pub struct Player {
    config: PlayerConfig,
}

impl Player {
    pub fn new(config: PlayerConfig) -> Self {
        Self { config }
    }

    pub async fn is_available(&self) -> bool {
        Command::new(&self.config.command)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn args_for(&self, transport: Transport) -> &[String] {
        match transport {
            Transport::Segmented => &self.config.segmented_args,
            Transport::Progressive => &self.config.progressive_args,
        }
    }

    /// Plays in the foreground until the player exits.
    pub async fn play(&self, stream: &ResolvedStream) -> Result<PlaybackOutcome> {
        drive_fallback(stream, |url, transport| self.launch(url, transport)).await
    }

    async fn launch(&self, url: String, transport: Transport) -> Result<Option<i32>> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(self.args_for(transport)).arg(&url);
        cmd.stdin(Stdio::null());

        debug!("Launching {} ({})", self.config.command, transport);
        let status = cmd.status().await.with_context(|| {
            format!("Failed to execute player command: {}", self.config.command)
        })?;

        Ok(status.code())
    }
}

/// Maps an mpv style exit code to a fault; `None` means playback ended normally.
///
/// 0 is a clean exit and 4 a user quit. 2 means the stream could not be
/// opened at all, 3 that it opened but failed while playing.
pub fn classify_exit(code: Option<i32>) -> Option<PlaybackFault> {
    match code {
        Some(0) | Some(4) => None,
        Some(2) => Some(PlaybackFault::Network),
        Some(3) => Some(PlaybackFault::Media),
        Some(code) => Some(PlaybackFault::Other(format!("player exited with code {}", code))),
        None => Some(PlaybackFault::Other("player killed by signal".to_string())),
    }
}

/// Runs `attempt` until playback ends cleanly or the fallback gives up.
pub async fn drive_fallback<F, Fut>(stream: &ResolvedStream, mut attempt: F) -> Result<PlaybackOutcome>
where
    F: FnMut(String, Transport) -> Fut,
    Fut: Future<Output = Result<Option<i32>>>,
{
    let mut fallback = PlaybackFallback::new(stream.transport);
    let mut attempts = 0;

    loop {
        let Some(transport) = fallback.transport() else {
            anyhow::bail!("Playback failed");
        };

        attempts += 1;
        let code = attempt(stream.url.clone(), transport).await?;
        let Some(fault) = classify_exit(code) else {
            return Ok(PlaybackOutcome::Finished { transport, attempts });
        };

        match fallback.on_fault(fault) {
            PlaybackAction::ReloadManifest => info!("Network error, reloading stream"),
            PlaybackAction::RecoverMedia => info!("Media error, recovering"),
            PlaybackAction::SwitchToProgressive => {
                warn!("Segmented playback failed, retrying as progressive stream")
            }
            PlaybackAction::GiveUp(reason) => anyhow::bail!("Playback failed: {}", reason),
        }
    }
}
