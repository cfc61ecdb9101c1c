use lecture_deck::session::Control;
use lecture_deck::{
    ContentLoader, Effect, FileLoader, FragmentOrigin, RuntimeConfig, RuntimeState,
    SegmentConfig, ServerCommand, Session, SpyConfig, ViewMode, ViewModeStore,
};
use pretty_assertions::assert_eq;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const LECTURE: &str = "# Mechanics\n\nIntro.\n\n## Forces\n\nPush.\n\n## Friction\n\nRub.\n";

fn course() -> (TempDir, Arc<dyn ContentLoader>) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("mechanics.md"), LECTURE).expect("Failed to write lecture");
    let loader: Arc<dyn ContentLoader> = Arc::new(FileLoader::new(
        temp_dir.path(),
        SegmentConfig::default(),
    ));
    (temp_dir, loader)
}

fn session(loader: &Arc<dyn ContentLoader>, store: &ViewModeStore) -> Session {
    Session::new(
        Arc::clone(loader),
        store.clone(),
        RuntimeConfig::default(),
        SpyConfig::default(),
    )
}

fn hello(session: &mut Session, json: &str) -> Vec<ServerCommand> {
    session.handle_text(json, Instant::now())
}

/// Tick until the background load has finished
fn tick_until_loaded(session: &mut Session) -> Vec<ServerCommand> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut out = Vec::new();
    while session.is_loading() && Instant::now() < deadline {
        out.extend(session.tick(Instant::now()));
        thread::sleep(Duration::from_millis(5));
    }
    out
}

#[test]
fn test_paginated_hello_loads_and_starts_at_fragment() {
    let (_dir, loader) = course();
    let store = ViewModeStore::in_memory();
    store.set(ViewMode::Paginated);
    let mut session = session(&loader, &store);

    let commands = hello(
        &mut session,
        r##"{"type":"hello","key":"mechanics","rendered":"paginated","fragment":"#forces"}"##,
    );
    assert_eq!(commands, vec![ServerCommand::mode(ViewMode::Paginated)]);
    assert_eq!(session.runtime().state(), RuntimeState::Collecting);

    let commands = tick_until_loaded(&mut session);
    assert_eq!(
        commands,
        vec![
            ServerCommand::Effect(Effect::ShowUnit {
                index: 1,
                id: "forces".to_string(),
                count: 3
            }),
            ServerCommand::Effect(Effect::ReplaceFragment {
                id: "forces".to_string(),
                origin: FragmentOrigin::Sync
            }),
        ]
    );

    let commands = session.handle_text(r#"{"type":"key","key":"ArrowRight"}"#, Instant::now());
    assert_eq!(
        commands[0],
        ServerCommand::Effect(Effect::ShowUnit {
            index: 2,
            id: "friction".to_string(),
            count: 3
        })
    );
    assert!(session
        .handle_text(r#"{"type":"key","key":"End"}"#, Instant::now())
        .is_empty());

    let commands = session.handle_text(r#"{"type":"goto","index":-4}"#, Instant::now());
    assert_eq!(session.runtime().index(), 0);
    assert_eq!(commands.len(), 3);
}

#[test]
fn test_unknown_key_reports_not_found() {
    let (_dir, loader) = course();
    let store = ViewModeStore::in_memory();
    store.set(ViewMode::Paginated);
    let mut session = session(&loader, &store);

    hello(&mut session, r#"{"type":"hello","key":"missing"}"#);
    let commands = tick_until_loaded(&mut session);
    assert_eq!(commands, vec![ServerCommand::not_found("missing")]);
    assert_eq!(session.runtime().state(), RuntimeState::Inactive);
}

#[test]
fn test_stale_page_is_told_to_reload() {
    let (_dir, loader) = course();
    let store = ViewModeStore::in_memory();
    store.set(ViewMode::Paginated);
    let mut session = session(&loader, &store);

    let commands = hello(
        &mut session,
        r#"{"type":"hello","key":"mechanics","rendered":"linear"}"#,
    );
    assert_eq!(
        commands,
        vec![
            ServerCommand::mode(ViewMode::Paginated),
            ServerCommand::reload()
        ]
    );
    assert!(!session.is_loading());
}

#[test]
fn test_mode_change_in_another_tab_reloads_this_one() {
    let (_dir, loader) = course();
    let store = ViewModeStore::in_memory();
    let mut session = session(&loader, &store);
    hello(
        &mut session,
        r#"{"type":"hello","key":"mechanics","rendered":"linear"}"#,
    );
    assert_eq!(session.page_mode(), ViewMode::Linear);

    store.set(ViewMode::Paginated);
    let commands = session.tick(Instant::now());
    assert_eq!(
        commands,
        vec![
            ServerCommand::mode(ViewMode::Paginated),
            ServerCommand::reload()
        ]
    );
    assert_eq!(session.page_mode(), ViewMode::Paginated);

    // Writing the same value again is not a change
    store.set(ViewMode::Paginated);
    assert!(session.tick(Instant::now()).is_empty());
}

#[test]
fn test_url_override_ignores_store_changes() {
    let (_dir, loader) = course();
    let store = ViewModeStore::in_memory();
    let mut session = session(&loader, &store);

    let commands = hello(
        &mut session,
        r#"{"type":"hello","key":"mechanics","mode":"paginated","rendered":"paginated"}"#,
    );
    assert_eq!(commands, vec![ServerCommand::mode(ViewMode::Paginated)]);
    assert_eq!(store.get(), ViewMode::Linear);

    store.set(ViewMode::Linear);
    store.set(ViewMode::Paginated);
    let commands = tick_until_loaded(&mut session);
    assert!(commands
        .iter()
        .all(|c| !matches!(c, ServerCommand::Control(Control::Reload))));
    assert_eq!(session.runtime().count(), 3);
}

#[test]
fn test_url_override_yields_to_a_narrow_viewport() {
    let (_dir, loader) = course();
    let store = ViewModeStore::in_memory();
    let mut session = session(&loader, &store);

    let commands = hello(
        &mut session,
        r#"{"type":"hello","key":"mechanics","mode":"paginated","rendered":"paginated","viewport_width":400}"#,
    );
    assert_eq!(
        commands,
        vec![ServerCommand::mode(ViewMode::Linear), ServerCommand::reload()]
    );
    assert_eq!(session.page_mode(), ViewMode::Linear);
    assert!(!session.is_loading());
}

#[test]
fn test_narrowing_an_overridden_deck_falls_back_to_linear() {
    let (_dir, loader) = course();
    let store = ViewModeStore::in_memory();
    let mut session = session(&loader, &store);
    hello(
        &mut session,
        r#"{"type":"hello","key":"mechanics","mode":"paginated","rendered":"paginated","viewport_width":1200}"#,
    );
    tick_until_loaded(&mut session);
    assert_eq!(session.runtime().state(), RuntimeState::Ready);

    let commands = session.handle_text(r#"{"type":"resize","width":300}"#, Instant::now());
    assert_eq!(
        commands,
        vec![ServerCommand::mode(ViewMode::Linear), ServerCommand::reload()]
    );
    assert_eq!(session.page_mode(), ViewMode::Linear);
    assert_eq!(session.runtime().state(), RuntimeState::Inactive);
    assert_eq!(store.get(), ViewMode::Linear);

    // The override is gone, so widening again does not bring the deck back
    // and later store writes apply to this tab
    assert!(session
        .handle_text(r#"{"type":"resize","width":1200}"#, Instant::now())
        .is_empty());
    store.set(ViewMode::Paginated);
    assert_eq!(
        session.tick(Instant::now()),
        vec![
            ServerCommand::mode(ViewMode::Paginated),
            ServerCommand::reload()
        ]
    );
}

#[test]
fn test_set_mode_on_narrow_viewport_is_coerced() {
    let (_dir, loader) = course();
    let store = ViewModeStore::in_memory();
    let mut session = session(&loader, &store);
    hello(
        &mut session,
        r#"{"type":"hello","key":"mechanics","rendered":"linear","viewport_width":500}"#,
    );

    let commands = session.handle_text(r#"{"type":"set_mode","mode":"paginated"}"#, Instant::now());
    assert_eq!(commands, vec![ServerCommand::mode(ViewMode::Linear)]);
    assert_eq!(store.get(), ViewMode::Linear);

    let commands = session.handle_text(r#"{"type":"resize","width":1200}"#, Instant::now());
    assert!(commands.is_empty());
    let commands = session.handle_text(r#"{"type":"set_mode","mode":"paginated"}"#, Instant::now());
    assert_eq!(
        commands,
        vec![
            ServerCommand::mode(ViewMode::Paginated),
            ServerCommand::reload()
        ]
    );
}

#[test]
fn test_narrowing_a_paginated_tab_falls_back_to_linear() {
    let (_dir, loader) = course();
    let store = ViewModeStore::in_memory();
    store.set(ViewMode::Paginated);
    let mut session = session(&loader, &store);
    hello(
        &mut session,
        r#"{"type":"hello","key":"mechanics","rendered":"paginated","viewport_width":1200}"#,
    );
    tick_until_loaded(&mut session);

    let commands = session.handle_text(r#"{"type":"resize","width":600}"#, Instant::now());
    assert_eq!(
        commands,
        vec![ServerCommand::mode(ViewMode::Linear), ServerCommand::reload()]
    );
    assert_eq!(store.get(), ViewMode::Linear);
    assert_eq!(session.runtime().state(), RuntimeState::Inactive);
}

#[test]
fn test_linear_scrolling_drives_the_scroll_spy() {
    let (_dir, loader) = course();
    let store = ViewModeStore::in_memory();
    let mut session = session(&loader, &store);
    hello(&mut session, r#"{"type":"hello","key":"mechanics"}"#);

    let t0 = Instant::now();
    let scroll = r#"{"type":"scroll","scroll_y":850,"height":1000,
        "headings":[{"id":"mechanics","top":0,"height":40},
                    {"id":"forces","top":900,"height":40},
                    {"id":"friction","top":2000,"height":40}]}"#;
    assert!(session.handle_text(scroll, t0).is_empty());
    assert_eq!(session.next_deadline(), Some(t0 + Duration::from_millis(50)));

    let commands = session.tick(t0 + Duration::from_millis(50));
    assert_eq!(
        commands,
        vec![
            ServerCommand::Effect(Effect::ActiveHeading {
                id: "forces".to_string()
            }),
            ServerCommand::Effect(Effect::ReplaceFragment {
                id: "forces".to_string(),
                origin: FragmentOrigin::Sync
            }),
        ]
    );

    let commands = session.handle_text(r#"{"type":"navigate","id":"friction"}"#, t0);
    assert_eq!(
        commands[0],
        ServerCommand::Effect(Effect::ScrollTo {
            id: "friction".to_string(),
            smooth: true
        })
    );
}

#[test]
fn test_input_before_hello_and_malformed_input_are_ignored() {
    let (_dir, loader) = course();
    let store = ViewModeStore::in_memory();
    let mut session = session(&loader, &store);

    assert!(session
        .handle_text(r#"{"type":"set_mode","mode":"paginated"}"#, Instant::now())
        .is_empty());
    assert_eq!(store.get(), ViewMode::Linear);

    hello(&mut session, r#"{"type":"hello","key":"mechanics"}"#);
    for text in ["", "{", r#"{"type":"teleport"}"#, r#"{"type":"key"}"#] {
        assert!(session.handle_text(text, Instant::now()).is_empty());
    }
    // Paginated-only input while linear does nothing
    assert!(session
        .handle_text(r#"{"type":"key","key":"ArrowRight"}"#, Instant::now())
        .is_empty());
}

#[test]
fn test_close_releases_the_subscription() {
    let (_dir, loader) = course();
    let store = ViewModeStore::in_memory();
    let mut first = session(&loader, &store);
    let second = {
        let mut s = session(&loader, &store);
        hello(&mut s, r#"{"type":"hello","key":"mechanics"}"#);
        s
    };
    hello(&mut first, r#"{"type":"hello","key":"mechanics"}"#);
    assert_eq!(store.subscriber_count(), 2);

    // A second hello replaces the subscription rather than adding one
    hello(&mut first, r#"{"type":"hello","key":"mechanics"}"#);
    assert_eq!(store.subscriber_count(), 2);

    first.close();
    first.close();
    assert!(first.is_closed());
    assert_eq!(store.subscriber_count(), 1);
    assert!(first
        .handle_text(r#"{"type":"hello","key":"mechanics"}"#, Instant::now())
        .is_empty());

    drop(second);
    assert_eq!(store.subscriber_count(), 0);
}

#[test]
fn test_commands_serialize_for_the_page() {
    assert_eq!(
        ServerCommand::mode(ViewMode::Paginated)
            .to_json()
            .expect("serialize"),
        r#"{"type":"mode","mode":"paginated"}"#
    );
    assert_eq!(
        ServerCommand::reload().to_json().expect("serialize"),
        r#"{"type":"reload"}"#
    );
    assert_eq!(
        ServerCommand::not_found("x").to_json().expect("serialize"),
        r#"{"type":"not_found","key":"x"}"#
    );
    assert_eq!(
        ServerCommand::from(Effect::ScrollToTop)
            .to_json()
            .expect("serialize"),
        r#"{"type":"scroll_to_top"}"#
    );
}
