// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use super::CommandContext;
use anyhow::Result;

use iptv_source::Player;
use iptv_source::player::PlaybackOutcome;

pub struct PlayCommand {
    pub channel_id: String,
    /// Print the resolved URL instead of starting the player.
    pub print_url: bool,
}

impl PlayCommand {
    pub async fn execute(self, context: CommandContext) -> Result<()> {
        context.require_source().await?;
        let channel = context.session.find_channel(&self.channel_id).await?;
        let stream = context.session.resolve(&channel)?;

        if self.print_url {
            println!("{}", stream.url);
            return Ok(());
        }

        let player = Player::new(context.config.player.clone());
        if !player.is_available().await {
            anyhow::bail!(
                "Player '{}' not found. Install it or set player.command in the config file.",
                context.config.player.command
            );
        }

        eprintln!("Playing: {} ({})", channel.name, stream.transport);
        let PlaybackOutcome::Finished { transport, attempts } = player.play(&stream).await?;
        if attempts > 1 {
            eprintln!("Playback ended ({} attempts, last as {})", attempts, transport);
        } else {
            eprintln!("Playback ended");
        }

        Ok(())
    }
}
