// ABOUTME: Library module for the lecture-deck program.
// ABOUTME: Segments Markdown lecture notes into slide units and renders them as text or as a deck.

// Reexport modules
pub mod assets;
pub mod config;
pub mod course;
pub mod document;
pub mod effect;
pub mod errors;
pub mod html;
pub mod layout;
pub mod loader;
pub mod parse;
pub mod runtime;
pub mod scroll_spy;
pub mod segment;
pub mod serve;
pub mod session;
pub mod slug;
pub mod utils;
pub mod view_mode;

// Reexport common types and functions
pub use assets::{Asset, AssetKind};
pub use config::{Config, ServeConfig};
pub use course::{load_course, Course, CourseEntry, EntryKind};
pub use document::{DocumentNode, Heading, HeadingEntry, LayoutTag, MediaKind, NodeKind};
pub use effect::{Effect, FragmentOrigin};
pub use errors::{DeckError, Result};
pub use html::{generate_html, render_page, write_html_to_file, PageOptions};
pub use layout::{classify, render_unit};
pub use loader::{CachedLoader, ContentLoader, FileLoader, LoadState, PendingLoad, RenderedDocument};
pub use parse::{parse_file, parse_markdown, ParseOptions};
pub use runtime::{Key, NavigationState, PresentationRuntime, RuntimeConfig, RuntimeState};
pub use scroll_spy::{active_heading, HeadingPosition, ScrollSpy, ScrollViewport, SpyConfig};
pub use segment::{segment, SegmentConfig, Segmenter, SlideUnit};
pub use serve::serve;
pub use session::{ClientMessage, ServerCommand, Session};
pub use slug::{slugify, Slugger};
pub use view_mode::{ModeScope, ViewMode, ViewModeStore};

#[cfg(test)]
mod tests;
