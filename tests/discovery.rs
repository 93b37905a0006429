// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

mod common;

use common::*;
use iptv_source::store::KEY_CREDENTIALS;
use iptv_source::{Credentials, SessionStore, SortOrder, SourceError, SourceKind, SourceSelection};

fn credentials() -> Credentials {
    Credentials::new(SERVER, "u", "p").unwrap()
}

#[tokio::test]
async fn test_discovery_picks_first_valid_candidate() {
    let h = Harness::new();
    // /player_api.php is unscripted and answers 404
    h.fetcher.on(
        &categories_url("/panel_api.php"),
        200,
        r#"{"error": "unknown action"}"#,
    );
    h.fetcher.on(&categories_url("/api.php"), 200, CATEGORIES);

    let kind = h
        .session
        .select_source(SourceSelection::Panel(credentials()))
        .await
        .unwrap();

    assert_eq!(kind, SourceKind::Panel);
    assert_eq!(
        h.session.credentials().unwrap().api_endpoint_path.as_deref(),
        Some("/api.php")
    );
    assert_eq!(
        h.fetcher.calls(),
        vec![
            categories_url("/player_api.php"),
            categories_url("/panel_api.php"),
            categories_url("/api.php"),
        ]
    );

    let stored: Credentials =
        serde_json::from_str(&h.store.get(KEY_CREDENTIALS).unwrap()).unwrap();
    assert_eq!(stored.api_endpoint_path.as_deref(), Some("/api.php"));
}

#[tokio::test]
async fn test_denial_page_is_not_accepted() {
    let h = Harness::new();
    h.fetcher
        .on(&categories_url("/player_api.php"), 200, "<html>Access denied</html>");
    h.fetcher.on(&categories_url("/panel_api.php"), 200, CATEGORIES);

    h.session
        .select_source(SourceSelection::Panel(credentials()))
        .await
        .unwrap();

    assert_eq!(
        h.session.credentials().unwrap().api_endpoint_path.as_deref(),
        Some("/panel_api.php")
    );
}

#[tokio::test]
async fn test_no_working_endpoint_leaves_no_source() {
    let h = Harness::new();

    let err = h
        .session
        .select_source(SourceSelection::Panel(credentials()))
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::NoWorkingEndpoint { .. }));
    assert!(err.is_connection_failure());
    assert_eq!(h.session.active_kind(), None);
    assert!(h.store.get(KEY_CREDENTIALS).is_none());
}

#[tokio::test]
async fn test_empty_category_list_is_soft_error() {
    let h = Harness::new();
    h.fetcher.on(&categories_url("/player_api.php"), 200, "[]");

    let err = h
        .session
        .select_source(SourceSelection::Panel(credentials()))
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::EmptyResult { what: "categories" }));
    assert!(!err.is_connection_failure());
}

#[tokio::test]
async fn test_remembered_endpoint_skips_probing() {
    let h = Harness::with_panel();
    h.session
        .select_source(SourceSelection::Panel(credentials()))
        .await
        .unwrap();
    h.fetcher.reset_calls();

    let restored = h.reopen();
    assert_eq!(restored.restore().await.unwrap(), Some(SourceKind::Panel));
    assert!(h.fetcher.calls().is_empty());

    // categories were cached by discovery
    let categories = restored.list_categories().await.unwrap();
    assert_eq!(categories.len(), 2);
    assert!(h.fetcher.calls().is_empty());

    let channels = restored
        .list_channels(Some("1"), SortOrder::Provider)
        .await
        .unwrap();
    assert_eq!(channels.len(), 2);
    assert_eq!(
        h.fetcher.calls(),
        vec![streams_url("/player_api.php", Some("1"))]
    );
}

#[tokio::test]
async fn test_failing_remembered_endpoint_is_probed_again() {
    let h = Harness::new();
    h.fetcher.on(&categories_url("/panel_api.php"), 200, CATEGORIES);
    h.fetcher
        .on(&streams_url("/panel_api.php", Some("1")), 200, NEWS_STREAMS);

    let mut remembered = credentials();
    remembered.api_endpoint_path = Some("/player_api.php".to_string());
    h.session
        .select_source(SourceSelection::Panel(remembered))
        .await
        .unwrap();
    assert!(h.fetcher.calls().is_empty());

    let channels = h
        .session
        .list_channels(Some("1"), SortOrder::Provider)
        .await
        .unwrap();
    assert_eq!(channels.len(), 2);
    assert_eq!(
        h.fetcher.calls(),
        vec![
            streams_url("/player_api.php", Some("1")),
            categories_url("/player_api.php"),
            categories_url("/panel_api.php"),
            streams_url("/panel_api.php", Some("1")),
        ]
    );

    let stored: Credentials =
        serde_json::from_str(&h.store.get(KEY_CREDENTIALS).unwrap()).unwrap();
    assert_eq!(stored.api_endpoint_path.as_deref(), Some("/panel_api.php"));
}

#[tokio::test]
async fn test_epg_failure_is_silent() {
    let h = Harness::with_panel();
    h.session
        .select_source(SourceSelection::Panel(credentials()))
        .await
        .unwrap();

    let url = format!("{}&stream_id=101", panel_url("/player_api.php", "get_short_epg"));
    h.fetcher.fail(&url);

    assert!(h.session.list_epg("101").await.is_empty());
}

#[tokio::test]
async fn test_epg_failure_keeps_remembered_endpoint() {
    let h = Harness::new();
    h.fetcher.on(&categories_url("/panel_api.php"), 200, CATEGORIES);

    let mut remembered = credentials();
    remembered.api_endpoint_path = Some("/player_api.php".to_string());
    h.session
        .select_source(SourceSelection::Panel(remembered))
        .await
        .unwrap();

    let url = format!("{}&stream_id=101", panel_url("/player_api.php", "get_short_epg"));
    h.fetcher.on(&url, 500, "");

    assert!(h.session.list_epg("101").await.is_empty());
    assert_eq!(h.fetcher.calls(), vec![url]);

    let stored: Credentials =
        serde_json::from_str(&h.store.get(KEY_CREDENTIALS).unwrap()).unwrap();
    assert_eq!(stored.api_endpoint_path.as_deref(), Some("/player_api.php"));
}

#[tokio::test]
async fn test_epg_titles_are_decoded() {
    let h = Harness::with_panel();
    h.session
        .select_source(SourceSelection::Panel(credentials()))
        .await
        .unwrap();

    // "Evening News" / "Headlines"
    let url = format!("{}&stream_id=101", panel_url("/player_api.php", "get_short_epg"));
    h.fetcher.on(
        &url,
        200,
        r#"{"epg_listings": [{
            "title": "RXZlbmluZyBOZXdz",
            "description": "SGVhZGxpbmVz",
            "start": "2025-01-01 18:00:00",
            "end": "2025-01-01 19:00:00",
            "start_timestamp": "1735754400",
            "stop_timestamp": "1735758000"
        }]}"#,
    );

    let epg = h.session.list_epg("101").await;
    assert_eq!(epg.len(), 1);
    assert_eq!(epg[0].title, "Evening News");
    assert_eq!(epg[0].description.as_deref(), Some("Headlines"));
    assert_eq!(epg[0].start.unwrap().timestamp(), 1735754400);
}
