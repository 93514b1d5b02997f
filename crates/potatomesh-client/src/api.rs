//! HTTP transport against a PotatoMesh instance.

use async_trait::async_trait;
use potatomesh_core::config::ApiConfig;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::{ClientError, Result};
use crate::source::{Feed, FeedQuery, FeedSource};

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Self::with_client(client, &config.base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        Ok(Self { client, base_url })
    }

    /// API root. Accepts a bare instance URL or one already ending in `/api`.
    pub fn api_base(&self) -> String {
        if self.base_url.ends_with("/api") {
            self.base_url.clone()
        } else {
            format!("{}/api", self.base_url)
        }
    }

    /// Instance root, without any `/api` suffix.
    pub fn instance_root(&self) -> &str {
        self.base_url
            .strip_suffix("/api")
            .unwrap_or(&self.base_url)
    }

    pub fn feed_url(&self, feed: Feed, query: &FeedQuery) -> Result<Url> {
        let raw = format!("{}/{}", self.api_base(), feed.path());
        let mut url = Url::parse(&raw).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", raw, e)))?;

        if let Some(node_id) = &query.node_id {
            url.path_segments_mut()
                .map_err(|_| ClientError::InvalidUrl(raw.clone()))?
                .push(node_id.trim());
        }

        {
            let mut pairs = url.query_pairs_mut();
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
            if query.history && feed == Feed::Nodes && query.node_id.is_none() {
                pairs.append_pair("history", "1");
            }
            if query.encrypted {
                // list endpoints take a boolean, per-node endpoints a flag
                let flag = if query.node_id.is_some() { "1" } else { "true" };
                pairs.append_pair("encrypted", flag);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        Ok(url)
    }

    /// Liveness probe against `GET /version`.
    pub async fn health_check(&self) -> Result<String> {
        let url = format!("{}/version", self.instance_root());
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status { url, status });
        }
        let body = response.text().await?;
        info!("PotatoMesh API healthy at {}", self.base_url);
        Ok(body.trim().to_string())
    }

    async fn get_json(&self, url: Url) -> Result<Option<Value>> {
        let response = self.client.get(url.clone()).send().await?;

        match response.status() {
            code if code.is_success() => {
                let body = response.text().await?;
                if body.trim().is_empty() {
                    return Ok(None);
                }
                serde_json::from_str(&body)
                    .map(Some)
                    .map_err(|e| ClientError::Decode {
                        url: url.to_string(),
                        message: e.to_string(),
                    })
            }

            StatusCode::NOT_FOUND => {
                debug!(%url, "No data");
                Ok(None)
            }

            status => Err(ClientError::Status {
                url: url.to_string(),
                status,
            }),
        }
    }
}

fn into_items(url: &Url, body: Option<Value>) -> Result<Vec<Value>> {
    match body {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(object @ Value::Object(_)) => Ok(vec![object]),
        Some(other) => Err(ClientError::Decode {
            url: url.to_string(),
            message: format!("expected an array or object, got {}", other),
        }),
    }
}

#[async_trait]
impl FeedSource for ApiClient {
    async fn fetch(&self, feed: Feed, query: &FeedQuery) -> Result<Vec<Value>> {
        let url = self.feed_url(feed, query)?;
        let body = self.get_json(url.clone()).await?;
        let items = into_items(&url, body)?;
        debug!(%feed, count = items.len(), "Fetched feed");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::with_client(Client::new(), base).unwrap()
    }

    #[test]
    fn api_base_accepts_either_form() {
        assert_eq!(client("https://mesh.example").api_base(), "https://mesh.example/api");
        assert_eq!(client("https://mesh.example/").api_base(), "https://mesh.example/api");
        assert_eq!(client("https://mesh.example/api/").api_base(), "https://mesh.example/api");
        assert_eq!(client("https://mesh.example/api").instance_root(), "https://mesh.example");
    }

    #[test]
    fn list_and_node_urls() {
        let api = client("https://mesh.example");
        let url = api
            .feed_url(Feed::Nodes, &FeedQuery::list(1000).with_history(true))
            .unwrap();
        assert_eq!(url.as_str(), "https://mesh.example/api/nodes?limit=1000&history=1");

        let url = api
            .feed_url(Feed::Messages, &FeedQuery::list(200).with_encrypted(true))
            .unwrap();
        assert_eq!(url.as_str(), "https://mesh.example/api/messages?limit=200&encrypted=true");

        let url = api
            .feed_url(
                Feed::Messages,
                &FeedQuery::for_node("!a1b2c3d4", Some(50)).with_encrypted(true),
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://mesh.example/api/messages/!a1b2c3d4?limit=50&encrypted=1"
        );

        let url = api.feed_url(Feed::Nodes, &FeedQuery::for_node("!aa", None)).unwrap();
        assert_eq!(url.as_str(), "https://mesh.example/api/nodes/!aa");
    }

    #[test]
    fn rejects_garbage_base_url() {
        assert!(matches!(
            ApiClient::with_client(Client::new(), "not a url"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn single_objects_become_one_item() {
        let url = Url::parse("http://x/api/nodes/!aa").unwrap();
        let items = into_items(&url, Some(serde_json::json!({"node_id": "!aa"}))).unwrap();
        assert_eq!(items.len(), 1);
        assert!(into_items(&url, None).unwrap().is_empty());
        assert!(into_items(&url, Some(serde_json::json!(3))).is_err());
    }
}
