use crate::errors::UsherError;
use crate::merge::merge_structure;
use crate::model::VersionContext;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

pub const DEFAULT_LANGUAGES: &[&str] = &["en", "fr"];
pub const FALLBACK_LANGUAGE: &str = "en";

/// Where tour documents come from.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Languages the tour data is written in, in declared order.
    async fn available_languages(&self) -> Result<Vec<String>, UsherError>;
    /// Localized content document for one language.
    async fn fetch_content(&self, lang: &str) -> Result<Map<String, Value>, UsherError>;
    /// Version-agnostic structure document.
    async fn fetch_structure(&self) -> Result<Map<String, Value>, UsherError>;
}

/// Loads and merges the documents for a user: pick the user's language if
/// the data has it (english otherwise), fetch content and structure, merge.
pub async fn load_merged(
    source: &dyn ContentSource,
    user_language: &str,
    versions: &VersionContext,
) -> Result<Map<String, Value>, UsherError> {
    let languages = source.available_languages().await?;
    let lang = if languages.iter().any(|l| l == user_language) {
        user_language
    } else {
        FALLBACK_LANGUAGE
    };

    let mut content = source.fetch_content(lang).await?;
    let structure = source.fetch_structure().await?;
    merge_structure(&mut content, &structure, versions)?;
    Ok(content)
}

/// Reads tour data straight from the data directory.
pub struct FsContentSource {
    data_dir: PathBuf,
    languages: Vec<String>,
}

impl FsContentSource {
    pub fn new(data_dir: impl Into<PathBuf>, languages: Option<&str>) -> Self {
        let languages = languages
            .map(|list| list.split(',').map(|l| l.trim().to_string()).collect())
            .unwrap_or_else(|| DEFAULT_LANGUAGES.iter().map(|l| l.to_string()).collect());
        FsContentSource {
            data_dir: data_dir.into(),
            languages,
        }
    }

    fn read_doc(&self, relative: &str) -> Result<Map<String, Value>, UsherError> {
        let path = self.data_dir.join(relative);
        let text = std::fs::read_to_string(&path)?;
        let value: Value = serde_json::from_str(&text)?;
        value
            .as_object()
            .cloned()
            .ok_or_else(|| UsherError::Document(format!("{} is not a JSON object", path.display())))
    }
}

#[async_trait]
impl ContentSource for FsContentSource {
    async fn available_languages(&self) -> Result<Vec<String>, UsherError> {
        Ok(self.languages.clone())
    }

    async fn fetch_content(&self, lang: &str) -> Result<Map<String, Value>, UsherError> {
        self.read_doc(&format!("{}.json", lang))
    }

    async fn fetch_structure(&self) -> Result<Map<String, Value>, UsherError> {
        self.read_doc("structure/structure.json")
    }
}

/// Fetches tour data from a running backend.
pub struct HttpContentSource {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct LanguagesBody {
    languages: Vec<String>,
}

impl HttpContentSource {
    pub fn new(base_url: &str) -> Self {
        HttpContentSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_doc(&self, path: &str) -> Result<Map<String, Value>, UsherError> {
        let url = format!("{}/{}", self.base_url, path);
        let value: Value = self.client.get(&url).send().await?.error_for_status()?.json().await?;
        value
            .as_object()
            .cloned()
            .ok_or_else(|| UsherError::Document(format!("{} is not a JSON object", url)))
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn available_languages(&self) -> Result<Vec<String>, UsherError> {
        let url = format!("{}/lang", self.base_url);
        let body: LanguagesBody = self.client.get(&url).send().await?.error_for_status()?.json().await?;
        Ok(body.languages)
    }

    async fn fetch_content(&self, lang: &str) -> Result<Map<String, Value>, UsherError> {
        self.fetch_doc(&format!("data/{}.json", lang)).await
    }

    async fn fetch_structure(&self) -> Result<Map<String, Value>, UsherError> {
        self.fetch_doc("data/structure/structure.json").await
    }
}
