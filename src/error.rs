// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the source layer.
///
/// `EmptyResult` and `Cooldown` are soft conditions the caller is expected
/// to show to the user; they never mean the session is broken.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot connect: no working API endpoint found on {server}")]
    NoWorkingEndpoint { server: String },

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("no {what} returned by the source")]
    EmptyResult { what: &'static str },

    #[error("manual refresh is on cooldown, try again in {}", format_wait(.remaining))]
    Cooldown { remaining: Duration },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("session store error: {0}")]
    Store(String),

    #[error("no source selected")]
    NoActiveSource,

    #[error("channel {0} not found")]
    ChannelNotFound(String),
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

impl SourceError {
    /// True for errors that mean the panel could not be reached or understood,
    /// as opposed to soft conditions like an empty list or a cooldown.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::NoWorkingEndpoint { .. }
                | Self::Http { .. }
                | Self::Status { .. }
                | Self::Decode(_)
        )
    }
}

/// Formats a wait time as `2h 59m` / `4m 10s` / `12s`.
pub fn format_wait(remaining: &Duration) -> String {
    let total = remaining.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds.max(1))
    }
}
