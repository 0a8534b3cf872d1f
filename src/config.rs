use lazy_static::lazy_static;
use serde::Deserialize;
use std::fs;

#[derive(Deserialize, Default)]
pub struct Config {
    pub log_level: Option<String>,
    /// Directory holding `<lang>.json` content files and `structure/structure.json`.
    pub data_path: Option<String>,
    /// Comma-separated list of languages the tour data is written in.
    pub languages: Option<String>,
    /// Where the backend persists user key/value pairs. In-memory only when unset.
    pub store_path: Option<String>,
    /// Apps for which tours are enabled, returned verbatim by `GET /apps`.
    pub apps: Option<Vec<String>>,
    pub min_viewport_width: Option<u32>,
    pub min_viewport_height: Option<u32>,
}

impl Config {
    fn from_file(path: &str) -> Result<Self, serde_yaml::Error> {
        match fs::read_to_string(path) {
            Ok(content) => serde_yaml::from_str(&content),
            Err(_) => Ok(Config::default()),
        }
    }
}

lazy_static! {
    pub static ref CONFIG: Config = Config::from_file("config.yaml").unwrap_or_default();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::from_file("definitely-not-here.yaml").unwrap();
        assert!(config.data_path.is_none());
        assert!(config.languages.is_none());
    }

    #[test]
    fn test_parse_yaml() {
        let config: Config = serde_yaml::from_str("data_path: data\nlanguages: en,fr,de\n").unwrap();
        assert_eq!(config.data_path.as_deref(), Some("data"));
        assert_eq!(config.languages.as_deref(), Some("en,fr,de"));
    }
}
