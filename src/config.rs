use anyhow::{anyhow, Context};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver},
    time::Duration,
};

use crate::{
    artwork::{ArtworkOptions, DEFAULT_ARTWORK_SIZE, DEFAULT_CORNER_RADIUS},
    bus::MPRIS_PREFIX,
};

const APP_DIR: &str = "now-playing-bar";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub session: SessionConfig,
    pub artwork: ArtworkConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Loads the first config file found, returning its path alongside.
    pub fn load_with_path() -> anyhow::Result<(Self, Option<PathBuf>)> {
        match Self::locate() {
            Some(path) => Ok((Self::load_from(&path)?, Some(path))),
            None => Ok((Config::default(), None)),
        }
    }

    pub fn locate() -> Option<PathBuf> {
        Self::candidates().into_iter().find(|path| path.exists())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn parse(data: &str) -> anyhow::Result<Self> {
        let doc: ConfigDocument = toml::from_str(data)?;
        Ok(doc.into())
    }

    fn candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = env::current_dir() {
            candidates.push(current_dir.join("config.toml"));
            candidates.push(current_dir.join("config").join("config.toml"));
            candidates.push(current_dir.join("config").join("nowplaying.toml"));
        }

        if let Ok(exe) = env::current_exe() {
            if let Some(dir) = exe.parent() {
                candidates.push(dir.join("config.toml"));
                candidates.push(dir.join("config").join("config.toml"));
                candidates.push(dir.join("config").join("nowplaying.toml"));
            }
        }

        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join(APP_DIR).join("config.toml"));
        }

        candidates
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub tick_interval_ms: u64,
    pub service_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            service_prefix: MPRIS_PREFIX.to_owned(),
        }
    }
}

impl SessionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.clamp(100, 10_000))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtworkConfig {
    pub size: u32,
    pub corner_radius: f32,
    pub http_timeout_secs: u64,
    pub background: bool,
}

impl Default for ArtworkConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_ARTWORK_SIZE,
            corner_radius: DEFAULT_CORNER_RADIUS,
            http_timeout_secs: 5,
            background: true,
        }
    }
}

impl ArtworkConfig {
    pub fn size(&self) -> u32 {
        self.size.clamp(16, 1024)
    }

    pub fn corner_radius(&self) -> f32 {
        let radius = if self.corner_radius.is_finite() {
            self.corner_radius
        } else {
            DEFAULT_CORNER_RADIUS
        };
        radius.clamp(0.0, self.size() as f32 / 2.0)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.clamp(1, 60))
    }

    pub fn options(&self) -> ArtworkOptions {
        ArtworkOptions {
            size_px: self.size(),
            corner_radius: self.corner_radius(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub max_chars: usize,
    pub idle_text: String,
    pub artwork_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_chars: 48,
            idle_text: "No player".to_owned(),
            artwork_path: None,
        }
    }
}

impl OutputConfig {
    pub fn max_chars(&self) -> usize {
        self.max_chars.clamp(8, 256)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    session: SessionSection,
    #[serde(default)]
    artwork: ArtworkSection,
    #[serde(default)]
    output: OutputSection,
}

impl From<ConfigDocument> for Config {
    fn from(value: ConfigDocument) -> Self {
        let session_defaults = SessionConfig::default();
        let artwork_defaults = ArtworkConfig::default();
        let output_defaults = OutputConfig::default();

        let session = SessionConfig {
            tick_interval_ms: value
                .session
                .tick_interval_ms
                .unwrap_or(session_defaults.tick_interval_ms),
            service_prefix: value
                .session
                .service_prefix
                .filter(|prefix| !prefix.is_empty())
                .unwrap_or(session_defaults.service_prefix),
        };

        let artwork = ArtworkConfig {
            size: value.artwork.size.unwrap_or(artwork_defaults.size),
            corner_radius: value
                .artwork
                .corner_radius
                .unwrap_or(artwork_defaults.corner_radius),
            http_timeout_secs: value
                .artwork
                .http_timeout_secs
                .unwrap_or(artwork_defaults.http_timeout_secs),
            background: value.artwork.background.unwrap_or(artwork_defaults.background),
        };

        let output = OutputConfig {
            max_chars: value.output.max_chars.unwrap_or(output_defaults.max_chars),
            idle_text: value.output.idle_text.unwrap_or(output_defaults.idle_text),
            artwork_path: value.output.artwork_path,
        };

        Config {
            session,
            artwork,
            output,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SessionSection {
    tick_interval_ms: Option<u64>,
    service_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ArtworkSection {
    size: Option<u32>,
    corner_radius: Option<f32>,
    http_timeout_secs: Option<u64>,
    background: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputSection {
    max_chars: Option<usize>,
    idle_text: Option<String>,
    artwork_path: Option<PathBuf>,
}

/// Watches one config file and reloads it when it changes on disk.
pub struct ConfigWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    changes_rx: Receiver<notify::Result<notify::Event>>,
}

impl ConfigWatcher {
    pub fn watch(path: &Path) -> anyhow::Result<Self> {
        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or_else(|| anyhow!("Config file {} has no parent directory", path.display()))?;

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            _watcher: watcher,
            changes_rx: rx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drains pending events; returns the reloaded config if the file changed.
    pub fn poll(&self) -> Option<Config> {
        let mut changed = false;
        while let Ok(event) = self.changes_rx.try_recv() {
            match event {
                Ok(evt) => {
                    if evt.paths.iter().any(|p| p.file_name() == self.path.file_name()) {
                        changed = true;
                    }
                }
                Err(err) => log::warn!("Config watcher error: {err}"),
            }
        }

        if !changed {
            return None;
        }

        match Config::load_from(&self.path) {
            Ok(config) => {
                log::info!("Reloaded config from {}", self.path.display());
                Some(config)
            }
            Err(err) => {
                log::warn!("Keeping previous config: {err:#}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.session.tick_interval(), Duration::from_millis(500));
        assert_eq!(config.artwork.options(), ArtworkOptions::square(184));
        assert_eq!(config.artwork.http_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_document_overrides_only_given_fields() {
        let config = Config::parse(
            r#"
            [artwork]
            size = 96
            background = false

            [output]
            idle_text = "Silence"
            artwork_path = "/tmp/cover.png"
            "#,
        )
        .unwrap();

        assert_eq!(config.artwork.size(), 96);
        assert!(!config.artwork.background);
        assert_eq!(config.artwork.corner_radius(), DEFAULT_CORNER_RADIUS);
        assert_eq!(config.output.idle_text, "Silence");
        assert_eq!(config.output.artwork_path, Some(PathBuf::from("/tmp/cover.png")));
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn accessors_clamp_out_of_range_values() {
        let config = Config::parse(
            r#"
            [session]
            tick_interval_ms = 1
            service_prefix = ""

            [artwork]
            size = 4
            corner_radius = 90.0
            http_timeout_secs = 600

            [output]
            max_chars = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.session.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.session.service_prefix, MPRIS_PREFIX);
        assert_eq!(config.artwork.size(), 16);
        assert_eq!(config.artwork.corner_radius(), 8.0);
        assert_eq!(config.artwork.http_timeout(), Duration::from_secs(60));
        assert_eq!(config.output.max_chars(), 8);
    }

    #[test]
    fn non_finite_corner_radius_falls_back_to_default() {
        let config = Config::parse("[artwork]\ncorner_radius = nan\n").unwrap();
        assert!(config.artwork.corner_radius.is_nan());
        assert_eq!(config.artwork.corner_radius(), DEFAULT_CORNER_RADIUS);
        assert_eq!(config.artwork.options(), ArtworkOptions::square(184));

        let config = Config::parse("[artwork]\nsize = 32\ncorner_radius = -inf\n").unwrap();
        assert_eq!(config.artwork.corner_radius(), DEFAULT_CORNER_RADIUS);
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(Config::parse("[artwork\nsize = ").is_err());
        assert!(Config::parse("[artwork]\nsize = \"big\"").is_err());
    }

    #[test]
    fn load_from_reports_path_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[session]\ntick_interval_ms = \"fast\"").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));

        fs::write(&path, "[session]\ntick_interval_ms = 250").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.session.tick_interval(), Duration::from_millis(250));
    }
}
