// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod m3u;
pub mod model;
pub mod player;
pub mod resolver;
pub mod session;
pub mod store;
pub mod xtream;

pub use cache::{CacheManager, CooldownGuard};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{SourceError, SourceResult};
pub use http::{HttpFetch, HttpResponse, ProxyFetcher};
pub use model::{Category, Channel, Credentials, SortOrder, SourceKind};
pub use player::Player;
pub use resolver::{ResolvedStream, StreamResolver, Transport};
pub use session::{SessionOptions, SourceSelection, SourceSession, ViewUpdate};
pub use store::{FileStore, MemoryStore, SessionStore};
