// ABOUTME: HTML page generation for the lecture-deck application
// ABOUTME: Builds full linear or paginated pages with course chrome, assets and the live session shim

use crate::assets::{asset_tags, Asset};
use crate::course::{Course, CourseEntry};
use crate::errors::{DeckError, Result};
use crate::layout::render_section;
use crate::loader::{load_document, RenderedDocument};
use crate::parse::ParseOptions;
use crate::segment::{SegmentConfig, Segmenter};
use crate::utils::{self, escape_html};
use crate::view_mode::{ModeScope, ViewMode, ViewModeStore};
use log::info;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::fs;
use std::path::Path;

const URL_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`');

/// Everything a page needs besides the document and the view mode
#[derive(Debug, Clone, Copy, Default)]
pub struct PageOptions<'a> {
    pub css: &'a [Asset],
    pub js: &'a [Asset],
    pub embed: bool,
    /// Port of the live session endpoint; enables the client shim
    pub session_port: Option<u16>,
    pub course: Option<&'a Course>,
    /// URL of this page without query, used for the view toggle
    pub page_url: Option<&'a str>,
}

impl PageOptions<'_> {
    fn is_live(&self) -> bool {
        self.session_port.is_some()
    }
}

/// URL of the page for a content key
pub fn module_url(key: &str) -> String {
    format!("/m/{}", utf8_percent_encode(key.trim_matches('/'), URL_PATH))
}

/// Render a complete HTML page for `doc` in the scope's view mode
pub fn render_page(doc: &RenderedDocument, scope: &ModeScope, options: &PageOptions<'_>) -> String {
    let mode = scope.mode();
    info!("Rendering {:?} as {} page", doc.key, mode);

    let mut html = String::from("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"UTF-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
    html.push_str(&format!("<title>{}</title>\n", escape_html(&doc.title)));
    html.push_str(&format!("<style>{}</style>\n", DEFAULT_CSS));
    html.push_str(&asset_tags(options.css, options.embed));
    html.push_str("</head>\n");

    html.push_str(&format!(
        "<body class=\"view-{mode}{}\" data-view-mode=\"{mode}\" data-key=\"{}\"",
        if options.is_live() { "" } else { " static" },
        escape_html(&doc.key),
    ));
    if let Some(port) = options.session_port {
        html.push_str(&format!(" data-session-port=\"{}\"", port));
    }
    if let Some(forced) = scope.override_mode() {
        html.push_str(&format!(" data-mode-override=\"{}\"", forced));
    }
    html.push_str(">\n");

    match mode {
        ViewMode::Linear => render_linear_body(&mut html, doc, options),
        ViewMode::Paginated => render_paginated_body(&mut html, doc, options),
    }

    html.push_str(&asset_tags(options.js, options.embed));
    if options.is_live() {
        html.push_str(&format!("<script>{}</script>\n", CLIENT_JS));
    }
    html.push_str("</body>\n</html>");
    html
}

fn view_toggle(html: &mut String, mode: ViewMode, options: &PageOptions<'_>) {
    let Some(url) = options.page_url else {
        return;
    };
    let other = mode.toggled();
    let label = match other {
        ViewMode::Linear => "Text view",
        ViewMode::Paginated => "Slide view",
    };
    html.push_str(&format!(
        "<a class=\"view-toggle\" href=\"{}?view={other}\" data-mode=\"{other}\">{}</a>\n",
        escape_html(url),
        label
    ));
}

fn render_linear_body(html: &mut String, doc: &RenderedDocument, options: &PageOptions<'_>) {
    html.push_str("<header class=\"page-header\">\n");
    html.push_str(&format!("<span class=\"page-title\">{}</span>\n", escape_html(&doc.title)));
    view_toggle(html, ViewMode::Linear, options);
    html.push_str("</header>\n<div class=\"layout\">\n<nav class=\"sidebar\">\n");

    match options.course {
        Some(course) => render_course_nav(html, course, doc),
        None => render_toc(html, doc),
    }

    html.push_str("</nav>\n<main class=\"content\">\n");
    for unit in &doc.units {
        html.push_str(&render_section(unit, ViewMode::Linear, false));
    }
    html.push_str("</main>\n</div>\n");
}

fn render_course_nav(html: &mut String, course: &Course, doc: &RenderedDocument) {
    html.push_str(&format!(
        "<div class=\"course-title\">{}</div>\n<ol class=\"modules\">\n",
        escape_html(&course.title)
    ));
    for entry in course.visible_modules() {
        let current = is_current(entry, doc);
        html.push_str(&format!(
            "<li class=\"module{}\"><a href=\"{}\">{}{}</a>\n",
            if current { " current" } else { "" },
            escape_html(&module_url(&entry.path)),
            entry
                .number
                .map(|n| format!("{}. ", n))
                .unwrap_or_default(),
            escape_html(&entry.title)
        ));
        if current {
            render_toc(html, doc);
        }
        html.push_str("</li>\n");
    }
    html.push_str("</ol>\n");

    let activities: Vec<&CourseEntry> = course.visible_activities().collect();
    if !activities.is_empty() {
        html.push_str("<div class=\"activities-title\">Activities</div>\n<ul class=\"activities\">\n");
        for entry in activities {
            html.push_str(&format!(
                "<li class=\"activity{}\"><a href=\"{}\">{}</a></li>\n",
                if is_current(entry, doc) { " current" } else { "" },
                escape_html(&module_url(&entry.path)),
                escape_html(&entry.title)
            ));
        }
        html.push_str("</ul>\n");
    }
}

fn is_current(entry: &CourseEntry, doc: &RenderedDocument) -> bool {
    entry.path.trim_matches('/') == doc.key.trim_matches('/')
}

fn render_toc(html: &mut String, doc: &RenderedDocument) {
    if doc.headings.is_empty() {
        return;
    }
    html.push_str("<ol class=\"toc\">\n");
    for heading in &doc.headings {
        let id = escape_html(&heading.id);
        html.push_str(&format!(
            "<li><a href=\"#{id}\" data-heading=\"{id}\">{}</a></li>\n",
            escape_html(&heading.text)
        ));
    }
    html.push_str("</ol>\n");
}

fn render_paginated_body(html: &mut String, doc: &RenderedDocument, options: &PageOptions<'_>) {
    let count = doc.units.len();
    html.push_str("<header class=\"deck-bar\">\n");
    html.push_str(&format!("<span class=\"deck-title\">{}</span>\n", escape_html(&doc.title)));
    if count > 0 {
        html.push_str("<button class=\"deck-prev\" data-key=\"ArrowLeft\" aria-label=\"Previous slide\">&#8249;</button>\n");
        html.push_str(&format!("<span class=\"deck-counter\">1/{}</span>\n", count));
        html.push_str("<button class=\"deck-next\" data-key=\"ArrowRight\" aria-label=\"Next slide\">&#8250;</button>\n");
    }
    view_toggle(html, ViewMode::Paginated, options);
    html.push_str("</header>\n<main class=\"deck\">\n");

    if doc.units.is_empty() {
        html.push_str("<div class=\"slide-placeholder\">This document has no slides</div>\n");
    }
    // Static exports keep every unit visible so each one prints on its own page
    let hide_rest = options.is_live();
    for (idx, unit) in doc.units.iter().enumerate() {
        html.push_str(&render_section(unit, ViewMode::Paginated, hide_rest && idx > 0));
    }
    html.push_str("</main>\n");
}

/// Page shown when a content key does not resolve
pub fn render_not_found(key: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n<title>Not found</title>\n<style>{}</style>\n</head>\n<body class=\"not-found\">\n<main class=\"content\">\n<h1>Not found</h1>\n<p>No document for <code>{}</code>.</p>\n<p><a href=\"/\">Back to the course</a></p>\n</main>\n</body>\n</html>",
        DEFAULT_CSS,
        escape_html(key)
    )
}

/// Render a Markdown file as a standalone page
pub fn generate_html(
    markdown_path: &Path,
    css_files: &[Asset],
    js_files: &[Asset],
    embed_resources: bool,
    mode: ViewMode,
) -> Result<String> {
    generate_html_with_config(
        markdown_path,
        css_files,
        js_files,
        embed_resources,
        mode,
        &SegmentConfig::default(),
    )
}

/// `generate_html` with explicit segmentation settings
pub fn generate_html_with_config(
    markdown_path: &Path,
    css_files: &[Asset],
    js_files: &[Asset],
    embed_resources: bool,
    mode: ViewMode,
    config: &SegmentConfig,
) -> Result<String> {
    info!("Generating HTML from markdown: {:?}", markdown_path);
    utils::validate_file_exists(markdown_path)?;

    let key = markdown_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let doc = load_document(
        markdown_path,
        &key,
        &Segmenter::new(config.clone()),
        &ParseOptions::default(),
    )?;

    let scope = ModeScope::with_override(ViewModeStore::in_memory(), Some(mode));
    let options = PageOptions {
        css: css_files,
        js: js_files,
        embed: embed_resources,
        ..PageOptions::default()
    };
    Ok(render_page(&doc, &scope, &options))
}

pub fn write_html_to_file(html_content: &str, output_path: &Path) -> Result<()> {
    info!("Writing HTML to file: {:?}", output_path);
    utils::ensure_parent_directory_exists(output_path)?;
    fs::write(output_path, html_content).map_err(DeckError::FileReadError)
}

const DEFAULT_CSS: &str = r#"
:root { --header-height: 64px; --accent: #2563eb; --muted: #6b7280; }
* { box-sizing: border-box; }
body { margin: 0; font-family: system-ui, sans-serif; line-height: 1.6; color: #111827; }
.page-header, .deck-bar { position: sticky; top: 0; z-index: 10; height: var(--header-height); display: flex; align-items: center; gap: 1rem; padding: 0 1.5rem; background: #fff; border-bottom: 1px solid #e5e7eb; }
.page-title, .deck-title { font-weight: 600; flex: 1; overflow: hidden; white-space: nowrap; text-overflow: ellipsis; }
.view-toggle { color: var(--accent); text-decoration: none; }
.layout { display: flex; }
.sidebar { position: sticky; top: var(--header-height); align-self: flex-start; width: 18rem; max-height: calc(100vh - var(--header-height)); overflow-y: auto; padding: 1rem; border-right: 1px solid #e5e7eb; }
.sidebar ol, .sidebar ul { padding-left: 1.2rem; }
.sidebar .current > a { font-weight: 600; }
.toc a { color: var(--muted); text-decoration: none; }
.toc a.active { color: var(--accent); font-weight: 600; }
.content { flex: 1; max-width: 48rem; padding: 1rem 2rem 4rem; }
.content [id] { scroll-margin-top: var(--header-height); }
.directive { margin: 1rem 0; }
.deck .slide { min-height: calc(100vh - var(--header-height)); padding: 2rem 3rem; }
.deck .slide[hidden] { display: none; }
.slide-layout-split { display: grid; grid-template-columns: 1fr 1fr; gap: 2rem; }
.media-fit { display: flex; align-items: center; justify-content: center; max-height: calc(100vh - var(--header-height) - 8rem); }
.media-fit img, .media-fit video, .media-fit iframe, .media-fit figure { max-width: 100%; max-height: 100%; object-fit: contain; }
.slide-placeholder { color: var(--muted); font-style: italic; padding: 2rem; text-align: center; }
.deck-bar button { border: 1px solid #d1d5db; background: #fff; border-radius: 4px; width: 2rem; height: 2rem; cursor: pointer; }
.static.view-paginated .deck .slide { scroll-snap-align: start; }
@media (max-width: 767px) { .sidebar { display: none; } .slide-layout-split { grid-template-columns: 1fr; } }
@media print {
  .page-header, .deck-bar, .sidebar { display: none; }
  .view-paginated .slide { page-break-after: always; break-after: page; min-height: auto; }
}
"#;

/// Client side of a live session: forwards input and geometry, applies commands
const CLIENT_JS: &str = r#"
(function () {
  var body = document.body;
  var key = body.dataset.key || '';
  var forced = body.dataset.modeOverride || null;
  var ws = new WebSocket('ws://' + location.hostname + ':' + body.dataset.sessionPort + '/');
  var scrollTimer = null;

  function send(msg) { if (ws.readyState === 1) ws.send(JSON.stringify(msg)); }

  function headingPositions() {
    var nodes = document.querySelectorAll('main h1[id], main h2[id], main h3[id], main h4[id], main h5[id], main h6[id]');
    return Array.prototype.map.call(nodes, function (el) {
      var rect = el.getBoundingClientRect();
      return { id: el.id, top: rect.top + window.scrollY, height: rect.height };
    });
  }

  function reportScroll(withHeadings) {
    var msg = { type: 'scroll', scroll_y: window.scrollY, height: window.innerHeight };
    if (withHeadings) msg.headings = headingPositions();
    send(msg);
  }

  function setFragment(id, origin) {
    var hash = '#' + encodeURIComponent(id);
    if (origin === 'user') history.pushState(null, '', hash);
    else history.replaceState(null, '', hash);
  }

  var handlers = {
    show_unit: function (c) {
      document.querySelectorAll('.deck .slide').forEach(function (el, i) { el.hidden = i !== c.index; });
      var counter = document.querySelector('.deck-counter');
      if (counter) counter.textContent = (c.index + 1) + '/' + c.count;
    },
    replace_fragment: function (c) { setFragment(c.id, c.origin); },
    scroll_to_top: function () { window.scrollTo(0, 0); },
    scroll_to: function (c) {
      var el = document.getElementById(c.id);
      if (el) el.scrollIntoView({ behavior: c.smooth ? 'smooth' : 'auto', block: 'start' });
    },
    active_heading: function (c) {
      document.querySelectorAll('.toc a[data-heading]').forEach(function (a) {
        a.classList.toggle('active', a.dataset.heading === c.id);
      });
    },
    placeholder: function () {},
    not_found: function () { body.classList.add('not-found'); },
    mode: function (c) { body.dataset.viewMode = c.mode; },
    reload: function () { location.reload(); }
  };

  ws.onopen = function () {
    send({ type: 'hello', key: key, mode: forced, rendered: body.dataset.viewMode, fragment: location.hash || null, viewport_width: window.innerWidth });
    if (body.dataset.viewMode === 'linear') reportScroll(true);
  };
  ws.onmessage = function (ev) {
    var cmd;
    try { cmd = JSON.parse(ev.data); } catch (e) { return; }
    var handler = handlers[cmd.type];
    if (handler) handler(cmd);
  };

  document.addEventListener('keydown', function (e) {
    if (e.target && /INPUT|TEXTAREA|SELECT/.test(e.target.tagName)) return;
    send({ type: 'key', key: e.key });
  });
  ['touchstart', 'touchmove', 'touchend', 'touchcancel'].forEach(function (name) {
    document.addEventListener(name, function (e) {
      var t = e.changedTouches[0];
      if (!t) return;
      send({ type: 'touch', phase: name.slice(5), touches: e.touches.length, x: t.clientX, y: t.clientY });
    }, { passive: true });
  });
  window.addEventListener('resize', function () {
    send({ type: 'resize', width: window.innerWidth });
    if (body.dataset.viewMode === 'linear') send({ type: 'headings', headings: headingPositions() });
  });
  window.addEventListener('scroll', function () {
    if (body.dataset.viewMode !== 'linear') return;
    if (scrollTimer) cancelAnimationFrame(scrollTimer);
    scrollTimer = requestAnimationFrame(function () { reportScroll(false); });
  }, { passive: true });
  document.querySelectorAll('.toc a[data-heading]').forEach(function (a) {
    a.addEventListener('click', function (e) {
      e.preventDefault();
      send({ type: 'navigate', id: a.dataset.heading });
    });
  });
  document.querySelectorAll('.deck-bar button[data-key]').forEach(function (b) {
    b.addEventListener('click', function () { send({ type: 'key', key: b.dataset.key }); });
  });
  var toggle = document.querySelector('.view-toggle');
  if (toggle && !forced) {
    toggle.addEventListener('click', function (e) {
      e.preventDefault();
      send({ type: 'set_mode', mode: toggle.dataset.mode });
    });
  }
})();
"#;
