// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

//! Xtream-Code style panel access: endpoint discovery, query building and
//! the read-only panel client.

pub mod client;
pub mod probe;
pub mod query;
pub mod types;

pub use client::PanelClient;
pub use probe::{Discovery, EndpointProber, RejectReason, ValidatorChain, Verdict};
pub use query::{DEFAULT_CANDIDATE_PATHS, PanelAction, build_query};
pub use types::{EpgEntry, PanelCategory, PanelStream};
