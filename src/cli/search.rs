// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use super::list::print_channels;
use super::{CommandContext, OutputFormat};
use anyhow::Result;

use iptv_source::SortOrder;

pub struct SearchCommand {
    pub query: String,
    pub category: Option<String>,
    pub sort: SortOrder,
    pub format: OutputFormat,
}

impl SearchCommand {
    pub async fn execute(self, context: CommandContext) -> Result<()> {
        context.require_source().await?;
        let results = context
            .session
            .search(&self.query, self.category.as_deref(), self.sort)
            .await?;

        if results.is_empty() && self.format == OutputFormat::Text {
            println!("No results found for '{}'", self.query);
            return Ok(());
        }

        print_channels(&context, &results, self.format)
    }
}
