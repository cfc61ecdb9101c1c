// ABOUTME: Course metadata for the lecture-deck application
// ABOUTME: Reads the ordered module/activity list from _course.json or discovers Markdown files

use crate::errors::{DeckError, Result};
use crate::parse::{parse_file, ParseOptions};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Course metadata file expected at the root of a course directory
pub const COURSE_FILE: &str = "_course.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Module,
    Activity,
    Info,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub title: String,
    /// Content key of the entry's document
    pub path: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    /// Position among visible modules, assigned on load
    #[serde(default, skip_deserializing)]
    pub number: Option<u32>,
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    #[serde(default)]
    pub code: String,
    pub title: String,
    pub entries: Vec<CourseEntry>,
}

impl Course {
    /// Course made of a single document
    pub fn single(title: &str, key: &str) -> Self {
        let mut course = Self {
            code: String::new(),
            title: title.to_string(),
            entries: vec![CourseEntry {
                id: "1".to_string(),
                kind: EntryKind::Module,
                title: title.to_string(),
                path: key.to_string(),
                visible: true,
                number: None,
            }],
        };
        course.number_modules();
        course
    }

    /// Number visible modules 1, 2, ... in order; everything else gets none
    pub fn number_modules(&mut self) {
        let mut counter = 1;
        for entry in &mut self.entries {
            entry.number = if entry.visible && entry.kind == EntryKind::Module {
                counter += 1;
                Some(counter - 1)
            } else {
                None
            };
        }
    }

    pub fn visible_modules(&self) -> impl Iterator<Item = &CourseEntry> {
        self.entries
            .iter()
            .filter(|e| e.visible && e.kind == EntryKind::Module)
    }

    pub fn visible_activities(&self) -> impl Iterator<Item = &CourseEntry> {
        self.entries
            .iter()
            .filter(|e| e.visible && e.kind == EntryKind::Activity)
    }

    /// Landing entry: the first visible module, else any visible entry
    pub fn first_visible(&self) -> Option<&CourseEntry> {
        self.visible_modules()
            .next()
            .or_else(|| self.entries.iter().find(|e| e.visible))
    }

    pub fn find(&self, path: &str) -> Option<&CourseEntry> {
        let path = path.trim_matches('/');
        self.entries
            .iter()
            .find(|e| e.visible && e.path.trim_matches('/') == path)
    }
}

/// Load course metadata for a directory.
///
/// Reads `_course.json` when present; otherwise every `*.md` file directly in
/// the directory becomes a module, in file name order, titled by its first
/// heading.
pub fn load_course(dir: &Path) -> Result<Course> {
    let course_file = dir.join(COURSE_FILE);
    let mut course = if course_file.is_file() {
        info!("Reading course metadata from {:?}", course_file);
        let raw = fs::read_to_string(&course_file).map_err(DeckError::FileReadError)?;
        serde_json::from_str::<Course>(&raw)
            .map_err(|e| DeckError::CourseError(format!("{:?}: {}", course_file, e)))?
    } else {
        discover_course(dir)?
    };
    course.number_modules();
    Ok(course)
}

fn discover_course(dir: &Path) -> Result<Course> {
    let pattern = format!("{}/*.md", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut paths: Vec<_> = glob::glob(&pattern)
        .map_err(|e| DeckError::CourseError(format!("Invalid glob pattern: {}", e)))?
        .flatten()
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(DeckError::CourseError(format!(
            "No {} and no Markdown files in {:?}",
            COURSE_FILE, dir
        )));
    }
    info!("Discovered {} Markdown documents in {:?}", paths.len(), dir);

    let entries = paths
        .iter()
        .enumerate()
        .filter_map(|(idx, path)| {
            let key = path.file_stem()?.to_string_lossy().into_owned();
            let title = match parse_file(path, &ParseOptions::default()) {
                Ok(doc) => doc.title,
                Err(e) => {
                    warn!("Skipping unreadable document {:?}: {}", path, e);
                    return None;
                }
            };
            Some(CourseEntry {
                id: (idx + 1).to_string(),
                kind: EntryKind::Module,
                title,
                path: key,
                visible: true,
                number: None,
            })
        })
        .collect();

    let title = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Course".to_string());

    Ok(Course {
        code: String::new(),
        title,
        entries,
    })
}
