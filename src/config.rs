// ABOUTME: Configuration module for the lecture-deck application
// ABOUTME: Provides configuration settings and environment variable handling

use crate::runtime::RuntimeConfig;
use crate::scroll_spy::SpyConfig;
use crate::segment::SegmentConfig;
use crate::view_mode::DEFAULT_BREAKPOINT_PX;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Global configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub breakpoint_px: f64,
    pub header_height_px: f64,
    pub swipe_threshold_px: f64,
    pub debounce_ms: u64,
    pub break_depths: Vec<u8>,
    pub intro_label: String,
    pub state_file: Option<PathBuf>,
    pub port: u16,
    pub embed_resources: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            breakpoint_px: DEFAULT_BREAKPOINT_PX,
            header_height_px: 64.0,
            swipe_threshold_px: 40.0,
            debounce_ms: 50,
            break_depths: vec![2, 3, 4],
            intro_label: "intro".to_string(),
            state_file: None,
            port: 8080,
            embed_resources: true,
        }
    }
}

/// Configuration for the preview server
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Markdown file or course directory
    pub root: PathBuf,
    pub port: u16,
    pub state_file: Option<PathBuf>,
    pub breakpoint_px: f64,
    /// Debounce for file system events
    pub watch_debounce_ms: u64,
    pub css_files: Vec<String>,
    pub js_files: Vec<String>,
    pub embed_resources: bool,
}

impl ServeConfig {
    /// Port of the WebSocket session endpoint
    pub fn session_port(&self) -> u16 {
        self.port.saturating_add(1)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}

/// Parse a comma separated list of heading depths, ignoring invalid entries
pub fn parse_break_depths(raw: &str) -> Vec<u8> {
    raw.split(',')
        .filter_map(|s| s.trim().parse::<u8>().ok())
        .filter(|d| (1..=6).contains(d))
        .collect()
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let break_depths = env::var("DECK_BREAK_DEPTHS")
            .ok()
            .map(|raw| parse_break_depths(&raw))
            .filter(|depths| !depths.is_empty())
            .unwrap_or(defaults.break_depths);
        let intro_label = env::var("DECK_INTRO_LABEL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.intro_label);
        let embed_resources = env::var("DECK_EMBED_RESOURCES")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.embed_resources);

        Self {
            breakpoint_px: env_parse("DECK_BREAKPOINT_PX").unwrap_or(defaults.breakpoint_px),
            header_height_px: env_parse("DECK_HEADER_HEIGHT_PX")
                .unwrap_or(defaults.header_height_px),
            swipe_threshold_px: env_parse("DECK_SWIPE_THRESHOLD_PX")
                .unwrap_or(defaults.swipe_threshold_px),
            debounce_ms: env_parse("DECK_DEBOUNCE_MS").unwrap_or(defaults.debounce_ms),
            break_depths,
            intro_label,
            state_file: env::var("DECK_STATE_FILE").ok().map(PathBuf::from),
            port: env_parse("DECK_PORT").unwrap_or(defaults.port),
            embed_resources,
        }
    }

    /// Get a segmentation configuration with defaults from this config
    pub fn get_segment_config(
        &self,
        break_depths: Option<Vec<u8>>,
        intro_label: Option<String>,
    ) -> SegmentConfig {
        SegmentConfig {
            break_depths: break_depths
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| self.break_depths.clone()),
            intro_label: intro_label.unwrap_or_else(|| self.intro_label.clone()),
        }
    }

    pub fn get_runtime_config(&self, swipe_threshold_px: Option<f64>) -> RuntimeConfig {
        RuntimeConfig {
            swipe_threshold_px: swipe_threshold_px.unwrap_or(self.swipe_threshold_px),
        }
    }

    pub fn get_spy_config(
        &self,
        header_height_px: Option<f64>,
        debounce_ms: Option<u64>,
    ) -> SpyConfig {
        SpyConfig {
            header_height: header_height_px.unwrap_or(self.header_height_px),
            debounce: Duration::from_millis(debounce_ms.unwrap_or(self.debounce_ms)),
            ..SpyConfig::default()
        }
    }

    pub fn get_serve_config(
        &self,
        root: PathBuf,
        port: Option<u16>,
        state_file: Option<PathBuf>,
        css_files: Vec<String>,
        js_files: Vec<String>,
    ) -> ServeConfig {
        ServeConfig {
            root,
            port: port.unwrap_or(self.port),
            state_file: state_file.or_else(|| self.state_file.clone()),
            breakpoint_px: self.breakpoint_px,
            watch_debounce_ms: 300,
            css_files,
            js_files,
            embed_resources: self.embed_resources,
        }
    }
}
