// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use anyhow::Result;
use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use iptv_source::{Config, SortOrder};

mod cli;
use cli::{
    CategoriesCommand, ChannelsCommand, CommandContext, EpgCommand, LoginCommand, LogoutCommand,
    OutputFormat, PlayCommand, PlaylistCommand, RefreshCommand, SearchCommand, StatusCommand,
};

fn cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Green.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
}

#[derive(Parser)]
#[command(name = "iptv-source")]
#[command(about = "Browse live channels from an Xtream panel or an M3U playlist")]
#[command(version)]
#[command(styles = cargo_style())]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging to file (iptv_source_debug.log)
    #[arg(long, global = true)]
    debug_log: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to an Xtream panel (prompts for anything not given)
    Login {
        /// Server URL, e.g. http://host:8080
        #[arg(short, long)]
        server: Option<String>,
        #[arg(short, long)]
        username: Option<String>,
        #[arg(short, long)]
        password: Option<String>,
        /// Friendly name for this panel
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Use an M3U playlist (URL or local file) as the source
    Playlist { location: String },

    /// List categories of the active source
    Categories {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List channels, optionally within one category
    Channels {
        #[arg(short, long)]
        category: Option<String>,
        /// Sort order (provider, name, recent)
        #[arg(short, long, default_value = "provider")]
        sort: String,
        /// Output format (text, json, m3u)
        #[arg(short, long, default_value = "text")]
        format: String,
        /// Maximum number of channels to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Search channels by name
    Search {
        query: String,
        #[arg(short, long)]
        category: Option<String>,
        /// Sort order (provider, name, recent)
        #[arg(short, long, default_value = "provider")]
        sort: String,
        /// Output format (text, json, m3u)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the short EPG of a channel
    Epg {
        channel_id: String,
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Play a channel with the configured player
    Play {
        channel_id: String,
        /// Print the stream URL instead of playing it
        #[arg(long)]
        print_url: bool,
    },

    /// Drop cached data for the active source (rate limited)
    Refresh,

    /// Forget the active source
    Logout,

    /// Show the active source
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn init_logging(cli: &Cli) -> Result<()> {
    if cli.debug_log {
        let file = File::create("iptv_source_debug.log")?;
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_level(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(
                EnvFilter::from_default_env()
                    .add_directive("iptv_source=debug".parse()?)
                    .add_directive("hyper_util=error".parse()?),
            )
            .init();
    } else if cli.verbose {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(tracing::Level::DEBUG.into())
                    .add_directive("hyper_util=error".parse()?),
            )
            .init();
    } else if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("hyper_util=error".parse()?),
            )
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path)?;
    tracing::debug!("Using config {}", config_path.display());

    let context = CommandContext::open(config)?;

    match cli.command {
        Commands::Login {
            server,
            username,
            password,
            name,
        } => {
            let cmd = LoginCommand {
                server,
                username,
                password,
                name,
            };
            cmd.execute(context).await?;
        }

        Commands::Playlist { location } => {
            PlaylistCommand { location }.execute(context).await?;
        }

        Commands::Categories { format } => {
            let cmd = CategoriesCommand {
                format: format.parse()?,
            };
            cmd.execute(context).await?;
        }

        Commands::Channels {
            category,
            sort,
            format,
            limit,
        } => {
            let cmd = ChannelsCommand {
                category,
                sort: sort.parse::<SortOrder>()?,
                format: format.parse::<OutputFormat>()?,
                limit,
            };
            cmd.execute(context).await?;
        }

        Commands::Search {
            query,
            category,
            sort,
            format,
        } => {
            let cmd = SearchCommand {
                query,
                category,
                sort: sort.parse::<SortOrder>()?,
                format: format.parse::<OutputFormat>()?,
            };
            cmd.execute(context).await?;
        }

        Commands::Epg { channel_id, format } => {
            let cmd = EpgCommand {
                channel_id,
                format: format.parse()?,
            };
            cmd.execute(context).await?;
        }

        Commands::Play {
            channel_id,
            print_url,
        } => {
            let cmd = PlayCommand {
                channel_id,
                print_url,
            };
            cmd.execute(context).await?;
        }

        Commands::Refresh => RefreshCommand.execute(context).await?,

        Commands::Logout => LogoutCommand.execute(context).await?,

        Commands::Status { format } => {
            let cmd = StatusCommand {
                format: format.parse()?,
            };
            cmd.execute(context).await?;
        }
    }

    Ok(())
}
