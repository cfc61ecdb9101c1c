use super::*;
use crate::effect::FragmentOrigin;
use crate::layout::{role_of, ContentRole};
use crate::runtime::{TouchEvent, TouchPhase};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn ids(units: &[SlideUnit]) -> Vec<&str> {
    units.iter().map(|u| u.id.as_str()).collect()
}

fn unit_ids(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("slide-{}", i)).collect()
}

fn touch(phase: TouchPhase, touches: usize, x: f64, y: f64) -> TouchEvent {
    TouchEvent {
        phase,
        touches,
        x,
        y,
    }
}

#[test]
fn test_slugify_strips_diacritics_and_punctuation() {
    assert_eq!(slugify("Introdução à Física"), "introducao-a-fisica");
    assert_eq!(slugify("Newton's 2nd Law"), "newtons-2nd-law");
    assert_eq!(slugify("  spaced   out  "), "spaced-out");
    assert_eq!(slugify("pre-existing - hyphen"), "pre-existing---hyphen");
    assert_eq!(slugify("!!!"), "");
}

#[test]
fn test_slugger_suffixes_collisions_in_call_order() {
    let mut slugger = Slugger::new();
    assert_eq!(slugger.slug("Overview", "slide"), "overview");
    assert_eq!(slugger.slug("Overview", "slide"), "overview-2");
    assert_eq!(slugger.slug("overview!", "slide"), "overview-3");
    assert_eq!(slugger.slug("", "slide"), "slide");
    assert_eq!(slugger.slug("???", "slide"), "slide-2");
    // A literal "-2" title never reuses an id already handed out
    assert_eq!(slugger.slug("Overview 2", "slide"), "overview-2-2");

    slugger.reset();
    assert_eq!(slugger.slug("Overview", "slide"), "overview");
}

#[test]
fn test_segment_ids_follow_heading_preference_and_collisions() {
    let nodes = vec![
        DocumentNode::heading(1, "Intro"),
        DocumentNode::heading(2, "A"),
        DocumentNode::heading(2, "B"),
        DocumentNode::heading(2, "A"),
    ];
    let units = segment(nodes);
    assert_eq!(ids(&units), vec!["intro", "a", "b", "a-2"]);
}

#[test]
fn test_segment_is_a_lossless_partition() {
    let nodes = vec![
        DocumentNode::paragraph("preface"),
        DocumentNode::layout_command(LayoutTag::SPLIT),
        DocumentNode::heading(2, "Forces"),
        DocumentNode::paragraph("push"),
        DocumentNode::slide_break(),
        DocumentNode::media(MediaKind::Image, "f.png", "diagram"),
        DocumentNode::heading(3, "Friction"),
        DocumentNode::heading(5, "Detail"),
        DocumentNode::slide_break(),
        DocumentNode::slide_break(),
        DocumentNode::paragraph("tail"),
    ];
    let expected: Vec<DocumentNode> = nodes.iter().filter(|n| !n.is_sentinel()).cloned().collect();

    let units = segment(nodes);
    let flattened: Vec<DocumentNode> = units.iter().flat_map(|u| u.nodes.clone()).collect();
    assert_eq!(flattened, expected);
    assert!(units.iter().all(|u| !u.nodes.is_empty()));
    assert_eq!(
        ids(&units),
        vec!["intro", "forces", "slide-3", "friction", "slide-5"]
    );
}

#[test]
fn test_segment_ids_are_unique() {
    let mut nodes = Vec::new();
    for _ in 0..5 {
        nodes.push(DocumentNode::heading(2, "Same"));
        nodes.push(DocumentNode::heading(3, "!!!"));
        nodes.push(DocumentNode::slide_break());
        nodes.push(DocumentNode::paragraph("orphan"));
    }
    let units = segment(nodes);
    let mut seen = std::collections::HashSet::new();
    for unit in &units {
        assert!(seen.insert(unit.id.clone()), "duplicate id {}", unit.id);
    }
    assert_eq!(units.len(), 15);
}

#[test]
fn test_segment_without_breakable_heading_is_one_unit() {
    let nodes = vec![
        DocumentNode::heading(1, "Only a title"),
        DocumentNode::paragraph("one"),
        DocumentNode::slide_break(),
        DocumentNode::heading(5, "deep"),
        DocumentNode::layout_command(LayoutTag::SPLIT),
        DocumentNode::paragraph("two"),
    ];
    let units = segment(nodes);
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].id, "only-a-title");
    assert_eq!(units[0].nodes.len(), 4);
    assert!(units[0].nodes.iter().all(|n| !n.is_sentinel()));

    let units = segment(Vec::new());
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].id, "intro");
    assert!(units[0].nodes.is_empty());

    let units = segment(vec![
        DocumentNode::slide_break(),
        DocumentNode::layout_command(LayoutTag::SPLIT),
    ]);
    assert_eq!(units.len(), 1);
    assert!(units[0].nodes.is_empty());
    assert_eq!(units[0].layout, LayoutTag::SPLIT);
}

#[test]
fn test_segment_layout_register_applies_when_unit_opens() {
    let nodes = vec![
        DocumentNode::heading(2, "One"),
        DocumentNode::layout_command(LayoutTag::SPLIT),
        DocumentNode::paragraph("still one"),
        DocumentNode::heading(2, "Two"),
        DocumentNode::heading(2, "Three"),
        DocumentNode::layout_command(LayoutTag::STACKED),
        DocumentNode::heading(2, "Four"),
    ];
    let units = segment(nodes);
    let layouts: Vec<u32> = units.iter().map(|u| u.layout.value()).collect();
    assert_eq!(layouts, vec![1, 2, 2, 1]);
}

#[test]
fn test_segment_config_changes_break_depths_and_intro_label() {
    let segmenter = Segmenter::new(SegmentConfig {
        break_depths: vec![2],
        intro_label: "welcome".to_string(),
    });
    let nodes = vec![
        DocumentNode::paragraph("hello"),
        DocumentNode::heading(2, "Part"),
        DocumentNode::heading(3, "Sub"),
    ];
    let units = segmenter.segment(nodes);
    assert_eq!(ids(&units), vec!["welcome", "part"]);
    assert_eq!(units[1].nodes.len(), 2);
}

#[test]
fn test_navigation_state_never_leaves_bounds() {
    for count in 0..5 {
        let mut nav = NavigationState::new(unit_ids(count));
        for _ in 0..10 {
            nav.next();
            assert!(count == 0 || nav.index() < count);
        }
        for _ in 0..10 {
            nav.prev();
        }
        assert_eq!(nav.index(), 0);
        nav.goto(usize::MAX);
        assert_eq!(nav.index(), count.saturating_sub(1));
    }
}

#[test]
fn test_runtime_emits_one_batch_per_index_change() {
    let mut runtime = PresentationRuntime::default();
    runtime.activate();
    let effects = runtime.ready(unit_ids(3), None);
    assert_eq!(
        effects,
        vec![
            Effect::ShowUnit {
                index: 0,
                id: "slide-1".to_string(),
                count: 3
            },
            Effect::ReplaceFragment {
                id: "slide-1".to_string(),
                origin: FragmentOrigin::Sync
            },
        ]
    );

    assert_eq!(
        runtime.next(),
        vec![
            Effect::ShowUnit {
                index: 1,
                id: "slide-2".to_string(),
                count: 3
            },
            Effect::ReplaceFragment {
                id: "slide-2".to_string(),
                origin: FragmentOrigin::Sync
            },
            Effect::ScrollToTop,
        ]
    );
    assert!(runtime.prev().len() == 3);
    assert!(runtime.prev().is_empty());
    assert!(runtime.first().is_empty());
    assert_eq!(runtime.last().len(), 3);
    assert!(runtime.handle_key(Key::from_dom("End")).is_empty());
}

#[test]
fn test_fragment_round_trip_restores_index() {
    let units = vec!["intro".to_string(), "forces".to_string(), "friction-2".to_string()];
    let mut runtime = PresentationRuntime::default();
    runtime.activate();
    runtime.ready(units.clone(), None);

    let fragment = runtime
        .goto(2)
        .into_iter()
        .find_map(|e| match e {
            Effect::ReplaceFragment { id, .. } => Some(id),
            _ => None,
        })
        .expect("fragment update");
    assert_eq!(fragment, "friction-2");

    let mut reloaded = PresentationRuntime::default();
    reloaded.activate();
    reloaded.ready(units.clone(), Some(&format!("#{}", fragment)));
    assert_eq!(reloaded.index(), 2);

    let mut encoded = PresentationRuntime::default();
    encoded.activate();
    encoded.ready(units, Some("#friction%2D2"));
    assert_eq!(encoded.index(), 2);
}

#[test]
fn test_runtime_ignores_input_outside_ready() {
    let mut runtime = PresentationRuntime::default();
    assert_eq!(runtime.state(), RuntimeState::Inactive);
    assert!(runtime.next().is_empty());

    runtime.activate();
    assert_eq!(runtime.state(), RuntimeState::Collecting);
    assert!(runtime.handle_key(Key::ArrowRight).is_empty());

    assert_eq!(runtime.ready(Vec::new(), Some("#x")), vec![Effect::Placeholder]);
    assert!(runtime.next().is_empty());
    assert!(runtime.goto(4).is_empty());

    runtime.deactivate();
    assert_eq!(runtime.state(), RuntimeState::Inactive);
    assert_eq!(runtime.count(), 0);
}

#[test]
fn test_swipe_is_suppressed_after_multi_touch() {
    let mut runtime = PresentationRuntime::default();
    runtime.activate();
    runtime.ready(unit_ids(3), None);

    // Single finger, right to left: next
    runtime.handle_touch(touch(TouchPhase::Start, 1, 300.0, 100.0));
    runtime.handle_touch(touch(TouchPhase::Move, 1, 200.0, 105.0));
    let effects = runtime.handle_touch(touch(TouchPhase::End, 0, 150.0, 110.0));
    assert_eq!(effects.len(), 3);
    assert_eq!(runtime.index(), 1);

    // Pinch: second finger lands, both lift one by one
    runtime.handle_touch(touch(TouchPhase::Start, 1, 300.0, 100.0));
    runtime.handle_touch(touch(TouchPhase::Start, 2, 320.0, 140.0));
    assert!(runtime.handle_touch(touch(TouchPhase::End, 1, 100.0, 100.0)).is_empty());
    assert!(runtime.handle_touch(touch(TouchPhase::End, 0, 90.0, 100.0)).is_empty());
    assert_eq!(runtime.index(), 1);

    // Short or mostly vertical drags do nothing
    runtime.handle_touch(touch(TouchPhase::Start, 1, 300.0, 100.0));
    assert!(runtime.handle_touch(touch(TouchPhase::End, 0, 280.0, 100.0)).is_empty());
    runtime.handle_touch(touch(TouchPhase::Start, 1, 300.0, 100.0));
    assert!(runtime.handle_touch(touch(TouchPhase::End, 0, 240.0, 300.0)).is_empty());

    // Left to right: prev
    runtime.handle_touch(touch(TouchPhase::Start, 1, 100.0, 100.0));
    assert_eq!(runtime.handle_touch(touch(TouchPhase::End, 0, 200.0, 90.0)).len(), 3);
    assert_eq!(runtime.index(), 0);
}

#[test]
fn test_view_mode_coerced_on_narrow_viewport() {
    let store = ViewModeStore::in_memory();
    assert_eq!(store.get(), ViewMode::Linear);

    store.observe_viewport(600.0);
    assert_eq!(store.set(ViewMode::Paginated), ViewMode::Linear);
    assert_eq!(store.get(), ViewMode::Linear);

    store.observe_viewport(1024.0);
    assert_eq!(store.set(ViewMode::Paginated), ViewMode::Paginated);
    assert_eq!(store.get(), ViewMode::Paginated);
}

#[test]
fn test_view_mode_subscribers_see_auto_downgrade() {
    let store = ViewModeStore::in_memory();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscription = store.subscribe(move |mode| sink.lock().push(mode));

    store.set(ViewMode::Paginated);
    assert_eq!(store.observe_viewport(500.0), ViewMode::Linear);
    store.observe_viewport(400.0);
    assert_eq!(*seen.lock(), vec![ViewMode::Paginated, ViewMode::Linear]);

    assert_eq!(store.subscriber_count(), 1);
    drop(subscription);
    assert_eq!(store.subscriber_count(), 0);
    store.set(ViewMode::Linear);
    assert_eq!(seen.lock().len(), 2);
}

#[test]
fn test_mode_scope_override_is_not_persisted() {
    let store = ViewModeStore::in_memory();
    let scope = ModeScope::with_override(store.clone(), Some(ViewMode::Paginated));
    assert_eq!(scope.mode(), ViewMode::Paginated);
    assert_eq!(store.get(), ViewMode::Linear);

    let inherited = scope.nested(None);
    assert_eq!(inherited.mode(), ViewMode::Paginated);
    assert_eq!(ModeScope::new(store).mode(), ViewMode::Linear);
}

#[test]
fn test_mode_scope_override_yields_to_narrow_viewport() {
    let store = ViewModeStore::in_memory();
    let scope = ModeScope::with_override(store.clone(), Some(ViewMode::Paginated));
    let nested = scope.nested(None);

    store.observe_viewport(400.0);
    assert!(store.is_narrow());
    assert_eq!(scope.mode(), ViewMode::Linear);
    assert_eq!(nested.mode(), ViewMode::Linear);
    assert_eq!(scope.override_mode(), Some(ViewMode::Paginated));

    // A linear override is unaffected and widening restores the override
    let linear = ModeScope::with_override(store.clone(), Some(ViewMode::Linear));
    assert_eq!(linear.mode(), ViewMode::Linear);
    store.observe_viewport(1200.0);
    assert!(!store.is_narrow());
    assert_eq!(scope.mode(), ViewMode::Paginated);
}

#[test]
fn test_scroll_spy_selects_last_heading_above_band() {
    let headings = vec![
        HeadingPosition::new("H1", 100.0, 40.0),
        HeadingPosition::new("H2", 800.0, 40.0),
        HeadingPosition::new("H3", 1600.0, 40.0),
    ];
    let viewport = ScrollViewport {
        scroll_y: 850.0,
        height: 900.0,
    };
    let config = SpyConfig::default();
    assert_eq!(active_heading(&headings, viewport, &config), Some("H2"));

    let top = ScrollViewport {
        scroll_y: 0.0,
        height: 900.0,
    };
    assert_eq!(active_heading(&headings, top, &config), Some("H1"));
    assert_eq!(active_heading(&[], top, &config), None);
}

#[test]
fn test_scroll_spy_debounces_recomputation() {
    let start = Instant::now();
    let mut spy = ScrollSpy::default();
    spy.observe(
        vec![
            HeadingPosition::new("a", 100.0, 30.0),
            HeadingPosition::new("b", 1200.0, 30.0),
        ],
        start,
    );
    spy.on_scroll(
        ScrollViewport {
            scroll_y: 1150.0,
            height: 800.0,
        },
        start,
    );
    assert!(spy.poll(start + Duration::from_millis(10)).is_empty());

    let effects = spy.poll(start + Duration::from_millis(60));
    assert_eq!(
        effects,
        vec![
            Effect::ActiveHeading { id: "b".to_string() },
            Effect::ReplaceFragment {
                id: "b".to_string(),
                origin: FragmentOrigin::Sync
            },
        ]
    );
    assert_eq!(spy.active(), Some("b"));
    assert!(spy.poll(start + Duration::from_millis(200)).is_empty());
}

#[test]
fn test_parse_markdown_builds_classified_nodes() {
    let doc = parse_markdown(
        "% Mechanics\n\n# Mechanics\n\nIntro text\n\n## Forces\n\n![push](push.png)\n\n---sldlayout2\n\n## Forces\n\n> quoted\n\n---sldbrk\n\n- a\n- b\n",
        &ParseOptions::default(),
    );
    assert_eq!(doc.title, "Mechanics");

    let kinds: Vec<&str> = doc
        .nodes
        .iter()
        .map(|n| match &n.kind {
            NodeKind::Heading { .. } => "heading",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Media { .. } => "media",
            NodeKind::Container { .. } => "container",
            NodeKind::Wrapper => "wrapper",
            NodeKind::Block => "block",
            NodeKind::Break => "break",
            NodeKind::LayoutCommand { .. } => "layout",
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "heading",
            "paragraph",
            "heading",
            "media",
            "layout",
            "heading",
            "wrapper",
            "break",
            "block"
        ]
    );

    let heading_ids: Vec<String> = doc
        .nodes
        .iter()
        .filter_map(|n| n.as_heading().map(|h| h.id))
        .collect();
    assert_eq!(heading_ids, vec!["mechanics", "forces", "forces-2"]);
    assert!(doc.nodes[5].html.contains("id=\"forces-2\""));
}

#[test]
fn test_directive_containers_group_nodes() {
    let doc = parse_markdown(
        "## Slide\n\n:::present-only\nOnly on slides\n:::\n\n::text-only\nOnly in text\n\n![fig](fig.png)\n::\n",
        &ParseOptions::default(),
    );
    assert_eq!(doc.nodes.len(), 3);
    assert_eq!(
        doc.nodes[1].kind,
        NodeKind::Container {
            name: "present-only".to_string()
        }
    );
    assert_eq!(doc.nodes[1].children.len(), 1);
    assert_eq!(doc.nodes[2].children.len(), 2);
    assert_eq!(role_of(&doc.nodes[2]), Some(ContentRole::Media));
    assert_eq!(role_of(&doc.nodes[1]), Some(ContentRole::Text));
}

#[test]
fn test_render_unit_respects_mode_and_layout() {
    let unit = SlideUnit {
        id: "forces".to_string(),
        layout: LayoutTag::SPLIT,
        nodes: vec![
            DocumentNode::heading(2, "Forces"),
            DocumentNode::paragraph("Push and pull"),
            DocumentNode::media(MediaKind::Image, "push.png", "push"),
            DocumentNode::container("present-only", vec![DocumentNode::paragraph("Slide note")]),
            DocumentNode::container("text-only", vec![DocumentNode::paragraph("Reading note")]),
        ],
    };

    let slide = render_unit(&unit, ViewMode::Paginated);
    assert!(slide.starts_with("<section class=\"slide\" data-id=\"forces\" data-layout=\"2\">"));
    assert!(slide.contains("<div class=\"slide-layout-split\">"));
    assert!(slide.contains("<div class=\"media-fit\">\n<img src=\"push.png\""));
    assert!(slide.contains("Slide note"));
    assert!(!slide.contains("Reading note"));
    let text_col = slide.find("slide-text").expect("text column");
    let media_col = slide.find("slide-media").expect("media column");
    assert!(slide.find("Push and pull").is_some_and(|p| p > text_col && p < media_col));

    let linear = render_unit(&unit, ViewMode::Linear);
    assert!(!linear.contains("slide-layout-split"));
    assert!(linear.contains("Reading note"));
    assert!(!linear.contains("Slide note"));
    let order: Vec<usize> = ["Forces", "Push and pull", "push.png"]
        .iter()
        .filter_map(|s| linear.find(s))
        .collect();
    assert!(order.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_split_layout_renders_placeholder_for_empty_column() {
    let unit = SlideUnit {
        id: "pictures".to_string(),
        layout: LayoutTag::SPLIT,
        nodes: vec![
            DocumentNode::heading(2, "Pictures"),
            DocumentNode::media(MediaKind::Video, "clip.mp4", ""),
        ],
    };
    let slide = render_unit(&unit, ViewMode::Paginated);
    assert!(slide.contains("slide-placeholder"));

    let odd = SlideUnit {
        layout: LayoutTag::new(7).expect("positive tag"),
        ..unit
    };
    let slide = render_unit(&odd, ViewMode::Paginated);
    assert!(slide.contains("data-layout=\"7\""));
    assert!(slide.contains("slide-layout-stacked"));
}

#[test]
fn test_classify_groups_by_role() {
    let nodes = vec![
        DocumentNode::heading(2, "T"),
        DocumentNode::slide_break(),
        DocumentNode::paragraph("p"),
        DocumentNode::wrapper(
            "<blockquote><img src=\"x.png\"></blockquote>",
            vec![DocumentNode::media(MediaKind::Image, "x.png", "")],
        ),
        DocumentNode::block("code", "<pre>code</pre>"),
    ];
    let classified = classify(&nodes);
    assert_eq!(classified.titles.len(), 1);
    assert_eq!(classified.text.len(), 2);
    assert_eq!(classified.media.len(), 1);
}

#[test]
fn test_effect_serialization_is_type_tagged() {
    let json = serde_json::to_string(&Effect::ReplaceFragment {
        id: "a".to_string(),
        origin: FragmentOrigin::Sync,
    })
    .expect("serialize");
    assert_eq!(json, r#"{"type":"replace_fragment","id":"a","origin":"sync"}"#);

    let reload = ServerCommand::reload().to_json().expect("serialize");
    assert_eq!(reload, r#"{"type":"reload"}"#);
}

#[test]
fn test_config_builders_apply_overrides() {
    let config = Config::default();
    let segment = config.get_segment_config(Some(vec![2]), None);
    assert_eq!(segment.break_depths, vec![2]);
    assert_eq!(segment.intro_label, "intro");
    assert_eq!(config.get_segment_config(Some(Vec::new()), None).break_depths, vec![2, 3, 4]);

    assert_eq!(config.get_runtime_config(Some(80.0)).swipe_threshold_px, 80.0);
    let spy = config.get_spy_config(None, Some(120));
    assert_eq!(spy.debounce, Duration::from_millis(120));
    assert_eq!(spy.header_height, 64.0);

    assert_eq!(config::parse_break_depths("2, 3,x,9"), vec![2, 3]);
}

#[test]
fn test_relative_keys_cannot_escape_root() {
    assert!(utils::validate_relative_key("physics/waves").is_ok());
    assert!(utils::validate_relative_key("intro/").is_ok());
    for key in ["", "/", "../x", "a/../../b", "/abs", "a\\b", "a//b", "nul\0"] {
        assert!(utils::validate_relative_key(key).is_err(), "{:?}", key);
    }
}

#[test]
fn test_escape_html() {
    assert_eq!(
        utils::escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
        "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
    );
}

#[test]
fn test_asset_tags_link_remote_and_skip_missing() {
    assert_eq!("css".parse::<AssetKind>().ok(), Some(AssetKind::Css));
    assert!("scss".parse::<AssetKind>().is_err());

    let remote = Asset::css("https://cdn.example.com/theme.css");
    assert!(remote.is_remote);
    assert_eq!(
        remote.tag(true).expect("remote assets link without fetching"),
        r#"<link rel="stylesheet" href="https://cdn.example.com/theme.css">"#
    );
    assert_eq!(
        Asset::js("nav.js").tag(false).expect("linked"),
        r#"<script src="nav.js"></script>"#
    );

    let missing = Asset::css("/definitely/not/here.css");
    assert!(missing.tag(true).is_err());
    assert_eq!(assets::asset_tags(&[missing], true), "");
}

#[test]
fn test_module_url_encodes_key() {
    assert_eq!(html::module_url("physics/waves"), "/m/physics/waves");
    assert_eq!(html::module_url("/intro notes/"), "/m/intro%20notes");
}
