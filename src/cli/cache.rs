// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use super::{CommandContext, spinner};
use anyhow::Result;

pub struct RefreshCommand;

impl RefreshCommand {
    pub async fn execute(self, context: CommandContext) -> Result<()> {
        context.require_source().await?;

        let pb = spinner("Refreshing...");
        let result = context.session.force_refresh().await;
        pb.finish_and_clear();

        let outcome = result?;
        println!("✓ Refreshed: {} categories", outcome.categories);
        if outcome.removed_entries > 0 {
            println!("  {} cached entries dropped", outcome.removed_entries);
        }

        Ok(())
    }
}
