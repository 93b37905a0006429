// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

//! Forgiving single-pass M3U parser and its inverse.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const EXTM3U: &str = "#EXTM3U";
const EXTINF: &str = "#EXTINF:";

static TVG_ID: LazyLock<Regex> = LazyLock::new(|| attr_regex("tvg-id"));
static TVG_NAME: LazyLock<Regex> = LazyLock::new(|| attr_regex("tvg-name"));
static TVG_LOGO: LazyLock<Regex> = LazyLock::new(|| attr_regex("tvg-logo"));
static GROUP_TITLE: LazyLock<Regex> = LazyLock::new(|| attr_regex("group-title"));
static X_TVG_URL: LazyLock<Regex> = LazyLock::new(|| attr_regex("x-tvg-url"));
static URL_TVG: LazyLock<Regex> = LazyLock::new(|| attr_regex("url-tvg"));

fn attr_regex(key: &str) -> Regex {
    Regex::new(&format!(r#"(?i)(?:^|[\s"]){}="([^"]*)""#, regex::escape(key)))
        .expect("attribute pattern is a valid regex")
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub duration: String,
    pub name: String,
    pub url: String,
    pub tvg_id: Option<String>,
    pub tvg_name: Option<String>,
    pub tvg_logo: Option<String>,
    pub group_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Playlist {
    pub entries: Vec<PlaylistEntry>,
    /// Guide URL from `x-tvg-url` / `url-tvg` on the header line.
    pub epg_url: Option<String>,
}

#[derive(Debug, Default)]
struct Pending {
    duration: String,
    name: String,
    tvg_id: Option<String>,
    tvg_name: Option<String>,
    tvg_logo: Option<String>,
    group_title: Option<String>,
}

pub fn parse(text: &str) -> Vec<PlaylistEntry> {
    let mut entries = Vec::new();
    let mut pending: Option<Pending> = None;

    for raw in text.lines() {
        let line = raw.trim().trim_start_matches('\u{feff}');

        if line.is_empty() {
            continue;
        }

        if let Some(info) = line.strip_prefix(EXTINF) {
            pending = Some(parse_extinf(info));
        } else if line.starts_with('#') {
            // #EXTM3U and any unknown tag
            continue;
        } else if let Some(meta) = pending.take() {
            if meta.name.is_empty() {
                continue;
            }
            entries.push(PlaylistEntry {
                duration: meta.duration,
                name: meta.name,
                url: line.to_string(),
                tvg_id: meta.tvg_id,
                tvg_name: meta.tvg_name,
                tvg_logo: meta.tvg_logo,
                group_title: meta.group_title,
            });
        }
    }

    entries
}

pub fn parse_playlist(text: &str) -> Playlist {
    let epg_url = text
        .lines()
        .map(|l| l.trim().trim_start_matches('\u{feff}'))
        .find(|l| !l.is_empty())
        .filter(|l| l.starts_with(EXTM3U))
        .and_then(|header| {
            header_attr(header, &X_TVG_URL).or_else(|| header_attr(header, &URL_TVG))
        });

    Playlist {
        entries: parse(text),
        epg_url,
    }
}

fn header_attr(line: &str, pattern: &Regex) -> Option<String> {
    pattern
        .captures(line)
        .map(|c| c[1].trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_extinf(info: &str) -> Pending {
    let (attrs, name) = match last_top_level_comma(info) {
        Some(pos) => (&info[..pos], info[pos + 1..].trim()),
        None => (info, ""),
    };

    let duration = attrs
        .split_whitespace()
        .next()
        .filter(|d| !d.contains('='))
        .unwrap_or("-1")
        .to_string();

    let capture = |re: &Regex| {
        re.captures(attrs)
            .map(|c| c[1].trim().to_string())
            .filter(|v| !v.is_empty())
    };

    Pending {
        duration,
        name: name.to_string(),
        tvg_id: capture(&TVG_ID),
        tvg_name: capture(&TVG_NAME),
        tvg_logo: capture(&TVG_LOGO),
        group_title: capture(&GROUP_TITLE),
    }
}

/// Byte offset of the last comma not inside a quoted attribute value.
fn last_top_level_comma(info: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut last = None;
    for (i, c) in info.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => last = Some(i),
            _ => {}
        }
    }
    // An unbalanced quote would hide every comma; fall back to the plain last comma.
    last.or_else(|| if in_quotes { info.rfind(',') } else { None })
}

pub fn serialize(entries: &[PlaylistEntry]) -> String {
    serialize_playlist(entries, None)
}

pub fn serialize_playlist(entries: &[PlaylistEntry], epg_url: Option<&str>) -> String {
    let mut out = String::from(EXTM3U);
    if let Some(epg) = epg_url {
        out.push_str(&format!(" x-tvg-url=\"{}\"", clean(epg)));
    }
    out.push('\n');

    for entry in entries.iter().filter(|e| !e.url.trim().is_empty()) {
        let duration = if entry.duration.is_empty() {
            "-1"
        } else {
            entry.duration.as_str()
        };
        out.push_str(EXTINF);
        out.push_str(duration);

        let attrs = [
            ("tvg-id", &entry.tvg_id),
            ("tvg-name", &entry.tvg_name),
            ("tvg-logo", &entry.tvg_logo),
            ("group-title", &entry.group_title),
        ];
        for (key, value) in attrs {
            if let Some(value) = value {
                out.push_str(&format!(" {}=\"{}\"", key, clean(value)));
            }
        }

        out.push(',');
        out.push_str(entry.name.trim());
        out.push('\n');
        out.push_str(entry.url.trim());
        out.push('\n');
    }

    out
}

// Quotes would end the attribute early and newlines would split the record.
fn clean(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '"' => '\'',
            '\r' | '\n' => ' ',
            other => other,
        })
        .collect()
}
