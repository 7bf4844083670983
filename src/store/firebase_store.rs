//! Cliente REST de Firebase Realtime Database
//!
//! Cada llamada tiene su propio timeout; un store lento no bloquea las
//! demás operaciones.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use super::{paths, DocumentStore, StoreError, StoreResult, UpdateSet};
use crate::config::StoreConfig;

pub struct FirebaseStore {
    base_url: String,
    auth_token: Option<String>,
    timeout: Duration,
    client: Client,
}

impl FirebaseStore {
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let base_url = config
            .url
            .clone()
            .ok_or_else(|| StoreError::Unavailable("STORE_URL is not configured".to_string()))?;

        let client = Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            timeout: config.timeout,
            client,
        })
    }

    /// URL `<base>/<path>.json` con cada segmento codificado
    fn url(&self, path: &str) -> StoreResult<String> {
        let encoded: Vec<String> = paths::segments(path)?
            .into_iter()
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        Ok(format!("{}/{}.json", self.base_url, encoded.join("/")))
    }

    fn request(&self, method: Method, path: &str) -> StoreResult<RequestBuilder> {
        let mut builder = self
            .client
            .request(method, self.url(path)?)
            .timeout(self.timeout);
        if let Some(token) = &self.auth_token {
            builder = builder.query(&[("auth", token)]);
        }
        Ok(builder)
    }

    async fn execute(&self, builder: RequestBuilder) -> StoreResult<Value> {
        let response = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("⚠️ Store respondió {}: {}", status, body);
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, error: reqwest::Error) -> StoreError {
        if error.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else {
            StoreError::Unavailable(error.to_string())
        }
    }
}

#[async_trait]
impl DocumentStore for FirebaseStore {
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<Vec<(String, Value)>> {
        // orderBy/equalTo esperan literales JSON
        let order_by = Value::String(field.to_string()).to_string();
        let equal_to = Value::String(value.to_string()).to_string();

        let builder = self
            .request(Method::GET, collection)?
            .query(&[("orderBy", order_by), ("equalTo", equal_to)]);

        let matches = match self.execute(builder).await? {
            Value::Object(children) => children
                .into_iter()
                .collect::<BTreeMap<String, Value>>()
                .into_iter()
                .collect(),
            _ => Vec::new(),
        };
        Ok(matches)
    }

    async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        let value = self.execute(self.request(Method::GET, path)?).await?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn child_keys(&self, path: &str) -> StoreResult<Vec<String>> {
        let builder = self.request(Method::GET, path)?.query(&[("shallow", "true")]);
        Ok(match self.execute(builder).await? {
            Value::Object(children) => children.keys().cloned().collect(),
            _ => Vec::new(),
        })
    }

    async fn update(&self, updates: &UpdateSet) -> StoreResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        updates.validate()?;

        let body: serde_json::Map<String, Value> = updates
            .iter()
            .map(|(path, value)| (path.trim_matches('/').to_string(), value.clone()))
            .collect();

        // PATCH sobre la raíz: la base aplica todos los paths o ninguno
        let builder = self.request(Method::PATCH, "")?.json(&body);
        self.execute(builder).await?;
        Ok(())
    }

    async fn set(&self, path: &str, value: Value) -> StoreResult<()> {
        let builder = self.request(Method::PUT, path)?.json(&value);
        self.execute(builder).await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        self.execute(self.request(Method::DELETE, path)?).await?;
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> StoreResult<String> {
        let builder = self.request(Method::POST, path)?.json(&value);
        let response = self.execute(builder).await?;
        response
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Rejected {
                status: 200,
                body: format!("push response without name: {}", response),
            })
    }

    fn backend_name(&self) -> &'static str {
        "firebase"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(url: &str) -> FirebaseStore {
        FirebaseStore::new(&StoreConfig {
            url: Some(url.to_string()),
            auth_token: None,
            timeout: Duration::from_secs(2),
            seed_path: None,
        })
        .unwrap()
    }

    #[test]
    fn test_url_building() {
        let store = store("https://fleet-demo.firebaseio.com/");
        assert_eq!(
            store.url("buses/V1/latitude").unwrap(),
            "https://fleet-demo.firebaseio.com/buses/V1/latitude.json"
        );
        assert_eq!(store.url("").unwrap(), "https://fleet-demo.firebaseio.com/.json");
        assert_eq!(
            store.url("Emergency/bus reader").unwrap(),
            "https://fleet-demo.firebaseio.com/Emergency/bus%20reader.json"
        );
        assert!(store.url("buses/a.b").is_err());
    }

    #[test]
    fn test_requires_url() {
        let result = FirebaseStore::new(&StoreConfig {
            url: None,
            auth_token: None,
            timeout: Duration::from_secs(1),
            seed_path: None,
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_store_is_unavailable() {
        let store = store("http://127.0.0.1:9");
        let result = store.get("buses").await;
        assert!(matches!(
            result,
            Err(StoreError::Unavailable(_)) | Err(StoreError::Timeout(_))
        ));
    }
}
