// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use super::{CommandContext, OutputFormat};
use anyhow::Result;
use serde_json::json;

use iptv_source::SourceKind;
use iptv_source::error::format_wait;

pub struct StatusCommand {
    pub format: OutputFormat,
}

impl StatusCommand {
    pub async fn execute(self, context: CommandContext) -> Result<()> {
        let kind = context.session.restore().await?;
        let credentials = context.session.credentials();
        let cooldown = context.session.refresh_cooldown();

        let info = json!({
            "source": kind.map(|k| k.as_str()),
            "panel": credentials.as_ref().map(|c| json!({
                "name": c.display_name(),
                "server": c.server,
                "username": c.username,
                "endpoint": c.api_endpoint_path,
            })),
            "refresh_available_in_secs": cooldown.map(|d| d.as_secs()),
            "state_file": context.state_path.display().to_string(),
        });

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
            OutputFormat::Text | OutputFormat::M3u => {
                match (kind, &credentials) {
                    (None, _) => println!("No source selected"),
                    (Some(SourceKind::Panel), Some(c)) => {
                        println!("Panel: {}", c.display_name());
                        if let Some(path) = &c.api_endpoint_path {
                            println!("  Endpoint: {}{}", c.server, path);
                        }
                    }
                    (Some(kind), _) => println!("Source: {}", kind),
                }
                if let Some(remaining) = cooldown {
                    println!("  Manual refresh available in {}", format_wait(&remaining));
                }
                println!("  State: {}", context.state_path.display());
            }
        }

        Ok(())
    }
}

pub struct LogoutCommand;

impl LogoutCommand {
    pub async fn execute(self, context: CommandContext) -> Result<()> {
        context.session.logout()?;
        println!("Logged out");
        Ok(())
    }
}
