use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use article_fetcher::{FetchSettings, Site};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::logging::LogDestination;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub language: String,
    /// Overrides `language` when set.
    pub api_url: Option<String>,
    pub output_dir: PathBuf,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_bytes: u64,
    pub log: LogDestination,
}

impl Default for AppConfig {
    fn default() -> Self {
        let settings = FetchSettings::default();
        Self {
            language: "en".to_string(),
            api_url: None,
            output_dir: PathBuf::from("articles"),
            connect_timeout_secs: settings.connect_timeout.as_secs(),
            request_timeout_secs: settings.request_timeout.as_secs(),
            max_bytes: settings.max_bytes,
            log: LogDestination::default(),
        }
    }
}

impl AppConfig {
    /// Defaults when no file is given; a given file must exist and parse.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        ron::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(lang) = &cli.lang {
            self.language = lang.clone();
            self.api_url = None;
        }
        if let Some(api_url) = &cli.api_url {
            self.api_url = Some(api_url.clone());
        }
        if let Some(out) = &cli.out {
            self.output_dir = out.clone();
        }
        if let Some(log) = cli.log {
            self.log = log;
        }
    }

    pub fn site(&self) -> anyhow::Result<Site> {
        let site = match &self.api_url {
            Some(api_url) => Site::from_api_url(api_url)?,
            None => Site::wikipedia(&self.language)?,
        };
        Ok(site)
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_bytes: self.max_bytes,
            ..FetchSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("wikifetch.ron");
        fs::write(&path, "(language: \"fr\", max_bytes: 1024, log: both)").unwrap();

        let config = AppConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(config.language, "fr");
        assert_eq!(config.max_bytes, 1024);
        assert_eq!(config.log, LogDestination::Both);
        assert_eq!(config.output_dir, PathBuf::from("articles"));
        assert_eq!(
            config.site().unwrap().api_url().as_str(),
            "https://fr.m.wikipedia.org/w/api.php"
        );
    }

    #[test]
    fn missing_or_broken_file_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(AppConfig::load(Some(temp.path().join("absent.ron").as_path())).is_err());

        let broken = temp.path().join("broken.ron");
        fs::write(&broken, "(language: ").unwrap();
        assert!(AppConfig::load(Some(broken.as_path())).is_err());
    }

    #[test]
    fn cli_overrides_file() {
        let mut config = AppConfig {
            api_url: Some("http://localhost:1/w/api.php".into()),
            ..AppConfig::default()
        };
        let cli =
            Cli::try_parse_from(["wikifetch", "--lang", "de", "--out", "x", "Berlin"]).unwrap();
        config.apply_cli(&cli);

        assert_eq!(config.api_url, None);
        assert_eq!(config.output_dir, PathBuf::from("x"));
        assert_eq!(config.site().unwrap().language(), Some("de"));
    }

    #[test]
    fn settings_follow_config() {
        let config = AppConfig {
            request_timeout_secs: 3,
            ..AppConfig::default()
        };
        let settings = config.fetch_settings();
        assert_eq!(settings.request_timeout, Duration::from_secs(3));
        assert_eq!(settings.redirect_limit, FetchSettings::default().redirect_limit);
    }
}
