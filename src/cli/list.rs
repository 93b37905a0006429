// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use super::{CommandContext, OutputFormat};
use anyhow::Result;
use serde_json::json;
use tracing::warn;

use iptv_source::m3u;
use iptv_source::session::channel_to_entry;
use iptv_source::{Channel, SortOrder};

pub struct CategoriesCommand {
    pub format: OutputFormat,
}

impl CategoriesCommand {
    pub async fn execute(self, context: CommandContext) -> Result<()> {
        context.require_source().await?;
        let categories = context.session.list_categories().await?;

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&categories)?);
            }
            OutputFormat::Text => {
                for category in &categories {
                    println!("{:>8}  {}", category.id, category.name);
                }
            }
            OutputFormat::M3u => {
                eprintln!("M3U format not supported for category list");
            }
        }

        Ok(())
    }
}

pub struct ChannelsCommand {
    pub category: Option<String>,
    pub sort: SortOrder,
    pub format: OutputFormat,
    pub limit: Option<usize>,
}

impl ChannelsCommand {
    pub async fn execute(self, context: CommandContext) -> Result<()> {
        context.require_source().await?;
        let mut channels = context
            .session
            .list_channels(self.category.as_deref(), self.sort)
            .await?;
        channels.truncate(self.limit.unwrap_or(usize::MAX));

        print_channels(&context, &channels, self.format)
    }
}

pub fn print_channels(context: &CommandContext, channels: &[Channel], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(channels)?);
        }
        OutputFormat::Text => {
            for channel in channels {
                println!("{:>8}  {}  [{}]", channel.id, channel.name, channel.category_id);
            }
        }
        OutputFormat::M3u => {
            let mut entries = Vec::with_capacity(channels.len());
            for channel in channels {
                match context.session.resolve(channel) {
                    Ok(stream) => entries.push(channel_to_entry(channel, stream.url)),
                    Err(e) => warn!("Skipping {}: {}", channel.name, e),
                }
            }
            let epg_url = context.session.playlist_epg_url();
            print!("{}", m3u::serialize_playlist(&entries, epg_url.as_deref()));
        }
    }

    Ok(())
}

pub struct EpgCommand {
    pub channel_id: String,
    pub format: OutputFormat,
}

impl EpgCommand {
    pub async fn execute(self, context: CommandContext) -> Result<()> {
        context.require_source().await?;
        let entries = context.session.list_epg(&self.channel_id).await;

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&json!(entries))?);
            }
            OutputFormat::Text | OutputFormat::M3u => {
                if entries.is_empty() {
                    println!("No programme information for channel {}", self.channel_id);
                }
                for entry in entries {
                    let start = entry
                        .start
                        .map(|t| t.format("%a %H:%M").to_string())
                        .unwrap_or_else(|| "--".to_string());
                    println!("{}  {}", start, entry.title);
                }
            }
        }

        Ok(())
    }
}
