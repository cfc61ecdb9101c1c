// ABOUTME: Slug generation for heading anchors and slide unit ids
// ABOUTME: Turns heading text into URL-safe ids that stay unique within one document pass

use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Convert text into a URL-safe identifier.
///
/// Lowercases, strips diacritics, drops everything except ASCII letters,
/// digits, hyphens and whitespace, then replaces each whitespace run with a
/// single hyphen. Hyphens already present are kept as written.
///
/// ```
/// use lecture_deck::slug::slugify;
///
/// assert_eq!(slugify("Introdução à Física"), "introducao-a-fisica");
/// assert_eq!(slugify("  Hello,   World! "), "hello-world");
/// assert_eq!(slugify("???"), "");
/// ```
pub fn slugify(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || c.is_whitespace())
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Collision registry scoped to one document pass.
///
/// The first occurrence of a slug is returned as is; later collisions get
/// `-2`, `-3`, ... appended in call order.
#[derive(Debug, Default, Clone)]
pub struct Slugger {
    used: HashSet<String>,
}

impl Slugger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slugify `text`, using `fallback` when nothing survives slugification,
    /// and make the result unique within this slugger.
    pub fn slug(&mut self, text: &str, fallback: &str) -> String {
        let mut base = slugify(text);
        if base.is_empty() {
            base = fallback.to_string();
        }

        let mut id = base.clone();
        let mut counter = 2;
        while self.used.contains(&id) {
            id = format!("{}-{}", base, counter);
            counter += 1;
        }
        self.used.insert(id.clone());
        id
    }

    /// Forget every id handed out so far.
    pub fn reset(&mut self) {
        self.used.clear();
    }
}
