// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use super::{CommandContext, spinner};
use anyhow::Result;
use inquire::validator::Validation;
use inquire::{Password, PasswordDisplayMode, Text};

use iptv_source::{Credentials, SourceSelection};

pub struct LoginCommand {
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

impl LoginCommand {
    pub async fn execute(self, context: CommandContext) -> Result<()> {
        let server = match self.server {
            Some(server) => server,
            None => prompt_server()?,
        };
        let username = match self.username {
            Some(username) => username,
            None => prompt_required("Username:")?,
        };
        let password = match self.password {
            Some(password) => password,
            None => Password::new("Password:")
                .with_display_mode(PasswordDisplayMode::Masked)
                .without_confirmation()
                .prompt()?,
        };

        let credentials = Credentials::new(&server, &username, &password)?.with_name(self.name);

        let pb = spinner("Looking for the panel API endpoint...");
        let result = context
            .session
            .select_source(SourceSelection::Panel(credentials))
            .await;
        pb.finish_and_clear();
        result?;

        let credentials = context
            .session
            .credentials()
            .ok_or_else(|| anyhow::anyhow!("Login did not activate a panel"))?;
        println!("✓ Connected to {}", credentials.display_name());
        if let Some(path) = &credentials.api_endpoint_path {
            println!("  API endpoint: {}{}", credentials.server, path);
        }

        Ok(())
    }
}

fn prompt_server() -> Result<String> {
    let server = Text::new("Server URL:")
        .with_help_message("e.g., http://your-server.com:8080")
        .with_validator(|input: &str| {
            if input.is_empty() {
                Ok(Validation::Invalid("Server URL is required".into()))
            } else if !input.starts_with("http://") && !input.starts_with("https://") {
                Ok(Validation::Invalid(
                    "URL must start with http:// or https://".into(),
                ))
            } else {
                Ok(Validation::Valid)
            }
        })
        .prompt()?;
    Ok(server)
}

fn prompt_required(label: &'static str) -> Result<String> {
    let value = Text::new(label)
        .with_validator(move |input: &str| {
            if input.trim().is_empty() {
                Ok(Validation::Invalid(format!("{} is required", label.trim_end_matches(':')).into()))
            } else {
                Ok(Validation::Valid)
            }
        })
        .prompt()?;
    Ok(value)
}

pub struct PlaylistCommand {
    pub location: String,
}

impl PlaylistCommand {
    pub async fn execute(self, context: CommandContext) -> Result<()> {
        let pb = spinner("Loading playlist...");
        let result = context
            .session
            .select_source(SourceSelection::Playlist {
                location: self.location.clone(),
            })
            .await;
        pb.finish_and_clear();
        result?;

        let categories = context.session.list_categories().await?;
        println!("✓ Loaded playlist {}", self.location);
        println!("  {} groups", categories.len());
        if let Some(epg) = context.session.playlist_epg_url() {
            println!("  EPG: {}", epg);
        }

        Ok(())
    }
}
