use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8002";
pub const DEFAULT_MODEL: &str = "Gemini 2.5 Flash";
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const API_URL_ENV: &str = "TKCOST_API_BASE_URL";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub default_model: Option<String>,
    pub page_size: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub pricing_file: Option<PathBuf>,
}

impl Config {
    /// Flag, then environment, then file, then the built-in default.
    pub fn api_base_url(&self, flag: Option<&str>, env: Option<String>) -> String {
        flag.map(str::to_string)
            .or(env.filter(|v| !v.trim().is_empty()))
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    pub fn model(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| self.default_model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    pub fn page_size(&self, flag: Option<u32>) -> u32 {
        flag.or(self.page_size).unwrap_or(DEFAULT_PAGE_SIZE).max(1)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS).max(1))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "tkcost")
}

/// Default parent directory for exports.
pub fn export_root() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|d| d.download_dir().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn parse_config(data: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(data)
}

pub fn load_config() -> Config {
    let Some(dirs) = project_dirs() else {
        return Config::default();
    };

    let path = dirs.config_dir().join("config.toml");
    let Ok(data) = fs::read_to_string(&path) else {
        return Config::default();
    };

    match parse_config(&data) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "invalid config, using defaults");
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_beats_env_beats_file() {
        let config = Config {
            api_base_url: Some("http://file".into()),
            ..Default::default()
        };
        assert_eq!(
            config.api_base_url(Some("http://flag"), Some("http://env".into())),
            "http://flag"
        );
        assert_eq!(config.api_base_url(None, Some("http://env".into())), "http://env");
        assert_eq!(config.api_base_url(None, Some("  ".into())), "http://file");
        assert_eq!(config.api_base_url(None, None), "http://file");
        assert_eq!(
            Config::default().api_base_url(None, None),
            DEFAULT_API_BASE_URL
        );
    }

    #[test]
    fn defaults_fill_gaps() {
        let config = Config::default();
        assert_eq!(config.model(None), DEFAULT_MODEL);
        assert_eq!(config.model(Some("GPT-4o")), "GPT-4o");
        assert_eq!(config.page_size(None), 50);
        assert_eq!(config.page_size(Some(0)), 1);
        assert_eq!(config.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn parses_toml_file() {
        let config = parse_config(
            r#"
api_base_url = "https://logs.example.com"
default_model = "Claude 3.5 Sonnet"
page_size = 20
timeout_secs = 3
pricing_file = "/etc/tkcost/pricing.toml"
"#,
        )
        .unwrap();
        assert_eq!(config.model(None), "Claude 3.5 Sonnet");
        assert_eq!(config.page_size(None), 20);
        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert_eq!(
            config.pricing_file.as_deref(),
            Some(std::path::Path::new("/etc/tkcost/pricing.toml"))
        );
    }

    #[test]
    fn unknown_keys_are_ignored() {
        assert!(parse_config("colour = \"blue\"").is_ok());
    }
}
