// ABOUTME: Side effects requested by the presentation runtime and the scroll spy
// ABOUTME: Values describing what the page must do; the caller decides how to apply them

use serde::Serialize;

/// Who asked for a fragment update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentOrigin {
    /// Keeping the URL in sync with state. Replaces the history entry and must
    /// not trigger scroll-to-target behaviour.
    Sync,
    /// Explicit user navigation such as a table-of-contents click.
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    ShowUnit { index: usize, id: String, count: usize },
    ReplaceFragment { id: String, origin: FragmentOrigin },
    ScrollToTop,
    ScrollTo { id: String, smooth: bool },
    ActiveHeading { id: String },
    /// Paginated view with no units to show
    Placeholder,
}
