use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Pipeline configuration, read from `config.toml` with every section and
/// field optional. API keys come from the environment (`TMDB_API_KEY`,
/// `OMDB_API_KEY`) and are never written into the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub tmdb: TmdbConfig,
    pub omdb: OmdbConfig,
    pub scraping: ScrapingConfig,
    pub enhancement: EnhancementConfig,
    pub staging: StagingConfig,
    pub trino: TrinoConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 500,
            timeout_seconds: 10,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TmdbConfig {
    pub base_url: String,
    pub delay_ms: u64,
    pub max_pages: u32,
    /// Hard cap on records per run, applied mid-page; None means pages alone
    /// bound the run
    pub max_movies: Option<usize>,
    pub include_details: bool,
    pub top_cast: usize,
    pub language: String,
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.themoviedb.org/3".to_string(),
            delay_ms: 250,
            max_pages: 5,
            max_movies: None,
            include_details: true,
            top_cast: 10,
            language: "en-US".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OmdbConfig {
    pub base_url: String,
    pub delay_ms: u64,
}

impl Default for OmdbConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.omdbapi.com/".to_string(),
            delay_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    pub delay_ms: u64,
    pub metacritic_enabled: bool,
    pub metacritic_base_url: String,
    pub rotten_tomatoes_enabled: bool,
    pub rotten_tomatoes_base_url: String,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1000,
            metacritic_enabled: true,
            metacritic_base_url: "https://www.metacritic.com".to_string(),
            rotten_tomatoes_enabled: true,
            rotten_tomatoes_base_url: "https://www.rottentomatoes.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// Allowed gap between our release year and a source-reported year
    /// before the source's block is withheld and flagged
    pub year_tolerance: i32,
    /// Emit a progress line every N records
    pub progress_interval: usize,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            year_tolerance: 0,
            progress_interval: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    pub dir: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: "data/raw".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrinoConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub catalog: String,
    pub schema: String,
    /// Rows per generated INSERT statement
    pub batch_size: usize,
}

impl Default for TrinoConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            user: "movielake".to_string(),
            catalog: "iceberg".to_string(),
            schema: "movies_stage".to_string(),
            batch_size: 100,
        }
    }
}

impl Config {
    /// Load configuration from `config.toml` when present, defaults otherwise.
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {e}", path.display()))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn tmdb_api_key(&self) -> Result<String> {
        std::env::var("TMDB_API_KEY").map_err(|_| {
            PipelineError::Config("TMDB_API_KEY environment variable is required".to_string())
        })
    }

    pub fn omdb_api_key(&self) -> Result<String> {
        std::env::var("OMDB_API_KEY").map_err(|_| {
            PipelineError::Config("OMDB_API_KEY environment variable is required".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_when_file_is_absent() {
        let config = Config::load_from("does-not-exist.toml").unwrap();
        assert_eq!(config.tmdb.delay_ms, 250);
        assert!(config.tmdb.max_movies.is_none());
        assert_eq!(config.omdb.delay_ms, 100);
        assert_eq!(config.scraping.delay_ms, 1000);
        assert_eq!(config.enhancement.year_tolerance, 0);
        assert_eq!(config.trino.schema, "movies_stage");
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(
            f,
            "[tmdb]\nmax_pages = 2\nmax_movies = 40\n\n[enhancement]\nyear_tolerance = 1\n"
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.tmdb.max_pages, 2);
        assert_eq!(config.tmdb.max_movies, Some(40));
        assert_eq!(config.tmdb.delay_ms, 250);
        assert_eq!(config.enhancement.year_tolerance, 1);
        assert_eq!(config.staging.dir, "data/raw");
    }
}
