use crate::errors::UsherError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Per-user key/value persistence, as the engines see it.
///
/// One attempt per call, no retries: a failed write on exit is logged and
/// forgotten, a failed read surfaces as a transient notice.
#[async_trait]
pub trait ConfigGateway: Send + Sync {
    /// Value for the key, empty string when never written.
    async fn get(&self, key: &str) -> Result<String, UsherError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), UsherError>;
    async fn set_many(&self, values: HashMap<String, String>) -> Result<(), UsherError>;
}

/// Gateway talking to the usher backend over HTTP.
pub struct HttpGateway {
    base_url: String,
    user: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ConfigValueBody {
    value: String,
}

impl HttpGateway {
    pub fn new(base_url: &str, user: &str) -> Self {
        HttpGateway {
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ConfigGateway for HttpGateway {
    async fn get(&self, key: &str) -> Result<String, UsherError> {
        let url = format!("{}/getconf/{}", self.base_url, key);
        let body: ConfigValueBody = self
            .client
            .get(&url)
            .header("X-User", &self.user)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), UsherError> {
        let url = format!("{}/saveconf", self.base_url);
        let mut body = HashMap::new();
        body.insert("key", key);
        body.insert("value", value);
        self.client
            .put(&url)
            .header("X-User", &self.user)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn set_many(&self, values: HashMap<String, String>) -> Result<(), UsherError> {
        let url = format!("{}/saveconfs", self.base_url);
        let mut body = HashMap::new();
        body.insert("configs", values);
        self.client
            .put(&url)
            .header("X-User", &self.user)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// In-memory gateway for tests and ad-hoc tours.
#[derive(Clone, Default)]
pub struct MemoryGateway {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        MemoryGateway::default()
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.values.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfigGateway for MemoryGateway {
    async fn get(&self, key: &str) -> Result<String, UsherError> {
        Ok(self.values.lock().unwrap().get(key).cloned().unwrap_or_default())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), UsherError> {
        self.values.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_many(&self, values: HashMap<String, String>) -> Result<(), UsherError> {
        self.values.lock().unwrap().extend(values);
        Ok(())
    }
}

/// Gateway whose writes and reads always fail, for exercising the
/// best-effort exit paths.
#[cfg(test)]
pub struct FailingGateway;

#[cfg(test)]
#[async_trait]
impl ConfigGateway for FailingGateway {
    async fn get(&self, _key: &str) -> Result<String, UsherError> {
        Err(UsherError::Gateway("backend unreachable".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), UsherError> {
        Err(UsherError::Gateway("backend unreachable".to_string()))
    }

    async fn set_many(&self, _values: HashMap<String, String>) -> Result<(), UsherError> {
        Err(UsherError::Gateway("backend unreachable".to_string()))
    }
}
