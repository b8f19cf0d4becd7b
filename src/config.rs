//! Persistent curator configuration model and defaults.

use std::path::{Path, PathBuf};

use log::info;

use crate::error::ConfigError;

const CONFIG_DIR_NAME: &str = "playlist-curator";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Remote playlist and request pacing.
    pub source: SourceConfig,
    #[serde(default)]
    /// Catalog file location and boilerplate columns.
    pub catalog: CatalogConfig,
    #[serde(default)]
    /// Thumbnail cache location and download policy.
    pub thumbnails: ThumbnailConfig,
    #[serde(default)]
    /// Mosaic banner output.
    pub banner: BannerConfig,
    #[serde(default)]
    /// Tag sanitizer policy.
    pub tags: TagConfig,
}

/// Remote playlist and request pacing preferences.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub playlist_url: String,
    /// Flat pause after each playlist item that touched the network.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Upper bound on playlist continuation pages followed per run.
    #[serde(default = "default_max_playlist_pages")]
    pub max_playlist_pages: u32,
}

/// Catalog file and constant rights columns.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
    #[serde(default = "default_rights")]
    pub rights: String,
    #[serde(default = "default_rights_statement")]
    pub rights_statement: String,
}

/// Thumbnail cache directory and download policy.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ThumbnailConfig {
    #[serde(default = "default_thumbnail_dir")]
    pub dir: PathBuf,
    /// Download URL with `{id}` replaced by the video id.
    #[serde(default = "default_thumbnail_url_template")]
    pub url_template: String,
    /// Non-success responses at or below this declared size are the platform's
    /// "no thumbnail" placeholder and are skipped silently.
    #[serde(default = "default_placeholder_max_bytes")]
    pub placeholder_max_bytes: u64,
}

/// Mosaic banner output path and fixed pixel dimensions.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BannerConfig {
    #[serde(default = "default_banner_path")]
    pub path: PathBuf,
    #[serde(default = "default_banner_width")]
    pub width: u32,
    #[serde(default = "default_banner_height")]
    pub height: u32,
}

/// Tag sanitizer patterns and stopwords.
///
/// `stopword_presets` names built-in lists merged into `stopwords`
/// (`"es-personal"`: Spanish articles, prepositions, pronouns and common verbs).
/// `lowercase` folds every emitted tag to lower case.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TagConfig {
    #[serde(default = "default_scrub_patterns")]
    pub scrub_patterns: Vec<String>,
    #[serde(default)]
    pub stopwords: Vec<String>,
    #[serde(default)]
    pub stopword_presets: Vec<String>,
    #[serde(default)]
    pub lowercase: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            playlist_url: String::new(),
            request_delay_ms: default_request_delay_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            user_agent: default_user_agent(),
            max_playlist_pages: default_max_playlist_pages(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            rights: default_rights(),
            rights_statement: default_rights_statement(),
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            dir: default_thumbnail_dir(),
            url_template: default_thumbnail_url_template(),
            placeholder_max_bytes: default_placeholder_max_bytes(),
        }
    }
}

impl Default for BannerConfig {
    fn default() -> Self {
        Self {
            path: default_banner_path(),
            width: default_banner_width(),
            height: default_banner_height(),
        }
    }
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            scrub_patterns: default_scrub_patterns(),
            stopwords: Vec::new(),
            stopword_presets: Vec::new(),
            lowercase: false,
        }
    }
}

fn default_request_delay_ms() -> u64 {
    2_000
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_read_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) playlist-curator/0.1.0".to_string()
}

fn default_max_playlist_pages() -> u32 {
    100
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("_data").join("data.csv")
}

fn default_rights() -> String {
    "Licencia de YouTube estándar".to_string()
}

fn default_rights_statement() -> String {
    "https://www.youtube.com/static?template=terms".to_string()
}

fn default_thumbnail_dir() -> PathBuf {
    PathBuf::from("_data").join("thumbnails")
}

fn default_thumbnail_url_template() -> String {
    "https://i.ytimg.com/vi/{id}/maxresdefault.jpg".to_string()
}

fn default_placeholder_max_bytes() -> u64 {
    1_097
}

fn default_banner_path() -> PathBuf {
    PathBuf::from("_data").join("banner.jpg")
}

fn default_banner_width() -> u32 {
    1_050
}

fn default_banner_height() -> u32 {
    660
}

fn default_scrub_patterns() -> Vec<String> {
    vec![r"\b\w{32}\b".to_string(), r"\b\d{5}\b".to_string()]
}

/// Clamps values that would make a run meaningless (zero-sized banner, zero timeouts).
pub fn sanitize_config(config: Config) -> Config {
    Config {
        source: SourceConfig {
            connect_timeout_secs: config.source.connect_timeout_secs.max(1),
            read_timeout_secs: config.source.read_timeout_secs.max(1),
            max_playlist_pages: config.source.max_playlist_pages.max(1),
            ..config.source
        },
        banner: BannerConfig {
            width: config.banner.width.clamp(1, 16_384),
            height: config.banner.height.clamp(1, 16_384),
            ..config.banner
        },
        ..config
    }
}

/// Default config file location under the user's config directory.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoConfigDir)
}

/// Writes the default configuration to `path`, creating parent directories.
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let serialized = toml::to_string(&Config::default())?;
    std::fs::write(path, serialized).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the config at `path`, writing defaults first when the file is missing.
pub fn load_or_create_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        write_default_config(path)?;
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = toml::from_str::<Config>(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(sanitize_config(parsed))
}

#[cfg(test)]
mod tests {
    use super::{load_or_create_config, sanitize_config, Config};
    use std::path::PathBuf;

    #[test]
    fn test_default_config_has_expected_values() {
        let config = Config::default();

        assert!(config.source.playlist_url.is_empty());
        assert_eq!(config.source.request_delay_ms, 2_000);
        assert_eq!(config.source.max_playlist_pages, 100);
        assert_eq!(config.catalog.path, PathBuf::from("_data").join("data.csv"));
        assert_eq!(
            config.catalog.rights_statement,
            "https://www.youtube.com/static?template=terms"
        );
        assert_eq!(config.thumbnails.placeholder_max_bytes, 1_097);
        assert!(config.thumbnails.url_template.contains("{id}"));
        assert_eq!(config.banner.width, 1_050);
        assert_eq!(config.banner.height, 660);
        assert_eq!(config.tags.scrub_patterns.len(), 2);
        assert!(config.tags.stopwords.is_empty());
    }

    #[test]
    fn test_partial_config_deserialization_fills_defaults() {
        let partial_toml = r#"
[source]
playlist_url = "https://www.youtube.com/playlist?list=PLabc"
request_delay_ms = 500

[banner]
width = 1500
"#;

        let parsed: Config = toml::from_str(partial_toml).expect("config should parse");
        assert_eq!(
            parsed.source.playlist_url,
            "https://www.youtube.com/playlist?list=PLabc"
        );
        assert_eq!(parsed.source.request_delay_ms, 500);
        assert_eq!(parsed.source.read_timeout_secs, 15);
        assert_eq!(parsed.banner.width, 1_500);
        assert_eq!(parsed.banner.height, 660);
        assert_eq!(parsed.thumbnails, Config::default().thumbnails);
        assert_eq!(parsed.tags, Config::default().tags);
    }

    #[test]
    fn test_sanitize_config_clamps_zero_values() {
        let mut config = Config::default();
        config.banner.width = 0;
        config.banner.height = 0;
        config.source.connect_timeout_secs = 0;
        config.source.max_playlist_pages = 0;
        config.source.request_delay_ms = 0;

        let sanitized = sanitize_config(config);
        assert_eq!(sanitized.banner.width, 1);
        assert_eq!(sanitized.banner.height, 1);
        assert_eq!(sanitized.source.connect_timeout_secs, 1);
        assert_eq!(sanitized.source.max_playlist_pages, 1);
        assert_eq!(sanitized.source.request_delay_ms, 0);
    }

    #[test]
    fn test_load_or_create_config_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("nested").join("config.toml");

        let loaded = load_or_create_config(&path).expect("config should be created");
        assert!(path.exists());
        assert_eq!(loaded, Config::default());

        let reloaded = load_or_create_config(&path).expect("config should reload");
        assert_eq!(reloaded, loaded);
    }

    #[test]
    fn test_load_or_create_config_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[banner\nwidth = ").expect("fixture should be written");

        assert!(load_or_create_config(&path).is_err());
    }
}
