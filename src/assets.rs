// ABOUTME: Stylesheet and script assets for the lecture-deck application
// ABOUTME: Reads local or fetches remote CSS/JS and emits embedded or linked page tags

use crate::errors::{DeckError, Result};
use log::{info, warn};
use reqwest::blocking::Client;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const FETCH_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Css,
    Js,
}

impl FromStr for AssetKind {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "css" => Ok(AssetKind::Css),
            "js" => Ok(AssetKind::Js),
            other => Err(DeckError::InvalidResourcePath(format!(
                "Unknown asset type: {}",
                other
            ))),
        }
    }
}

/// A stylesheet or script given as a local path or a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub kind: AssetKind,
    pub path: String,
    pub is_remote: bool,
}

impl Asset {
    pub fn new(kind: AssetKind, path: &str) -> Self {
        let is_remote = path.starts_with("http://") || path.starts_with("https://");
        Self {
            kind,
            path: path.to_string(),
            is_remote,
        }
    }

    pub fn css(path: &str) -> Self {
        Self::new(AssetKind::Css, path)
    }

    pub fn js(path: &str) -> Self {
        Self::new(AssetKind::Js, path)
    }

    pub fn content(&self) -> Result<String> {
        if self.is_remote {
            self.fetch_remote_content()
        } else {
            self.read_local_content()
        }
    }

    fn fetch_remote_content(&self) -> Result<String> {
        info!("Fetching remote asset: {}", self.path);

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(DeckError::FetchError)?;

        let mut retry_delay = 500;
        let mut last_error = None;

        for attempt in 1..=FETCH_ATTEMPTS {
            match client.get(&self.path).send() {
                Ok(response) if response.status().is_success() => {
                    return response.text().map_err(DeckError::FetchError);
                }
                Ok(response) => {
                    last_error = Some(DeckError::ValidationError(format!(
                        "HTTP error: {}",
                        response.status()
                    )));
                }
                Err(e) => last_error = Some(DeckError::FetchError(e)),
            }

            if attempt < FETCH_ATTEMPTS {
                info!(
                    "Fetch attempt {} failed, retrying in {} ms",
                    attempt, retry_delay
                );
                std::thread::sleep(Duration::from_millis(retry_delay));
                retry_delay *= 2;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DeckError::ValidationError("Unknown error fetching asset".to_string())
        }))
    }

    fn read_local_content(&self) -> Result<String> {
        info!("Reading local asset: {}", self.path);
        let path = Path::new(&self.path);
        if !path.exists() {
            return Err(DeckError::PathNotFoundError(path.to_path_buf()));
        }
        fs::read_to_string(path).map_err(DeckError::FileReadError)
    }

    /// HTML tag for the asset. Remote assets are always linked; local ones
    /// are inlined when `embed` is set.
    pub fn tag(&self, embed: bool) -> Result<String> {
        if self.is_remote || !embed {
            return Ok(match self.kind {
                AssetKind::Css => format!(r#"<link rel="stylesheet" href="{}">"#, self.path),
                AssetKind::Js => format!(r#"<script src="{}"></script>"#, self.path),
            });
        }

        let content = self.content()?;
        Ok(match self.kind {
            AssetKind::Css => format!("<style>{}</style>", content),
            AssetKind::Js => format!("<script>{}</script>", content),
        })
    }
}

/// Tags for every asset; failing assets are skipped with a warning
pub fn asset_tags(assets: &[Asset], embed: bool) -> String {
    let mut tags = String::new();
    for asset in assets {
        match asset.tag(embed) {
            Ok(tag) => {
                tags.push_str(&tag);
                tags.push('\n');
            }
            Err(e) => warn!("Failed to include asset {}: {}", asset.path, e),
        }
    }
    tags
}
