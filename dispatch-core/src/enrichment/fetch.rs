use super::{EnrichmentError, encode::decode_data_uri};

use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use tracing::debug;
use url::Url;

/// Source of secondary assets (personnel photos).
#[async_trait]
pub trait AssetFetcher: Send + Sync + fmt::Debug {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, EnrichmentError>;
}

/// Fetches assets over HTTP. Relative references resolve against the API
/// base; inline `data:` URIs are decoded without a request.
#[derive(Debug, Clone)]
pub struct HttpAssetFetcher {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpAssetFetcher {
    pub fn new(client: Client, base: Url) -> Self {
        Self {
            client,
            base,
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn resolve(&self, reference: &str) -> Result<Url, EnrichmentError> {
        match Url::parse(reference) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .base
                .join(reference)
                .map_err(|e| EnrichmentError::UrlResolution(e.to_string())),
            Err(e) => Err(EnrichmentError::UrlResolution(e.to_string())),
        }
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, EnrichmentError> {
        if reference.starts_with("data:") {
            return decode_data_uri(reference);
        }

        let url = self.resolve(reference)?;
        debug!(%url, "fetching marker asset");
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| EnrichmentError::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| EnrichmentError::Network(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| EnrichmentError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> HttpAssetFetcher {
        HttpAssetFetcher::new(
            Client::new(),
            Url::parse("https://dispatch.example/api/").unwrap(),
        )
    }

    #[test]
    fn relative_references_join_the_base() {
        let url = fetcher().resolve("photos/7.jpg").unwrap();
        assert_eq!(url.as_str(), "https://dispatch.example/api/photos/7.jpg");
        let absolute = fetcher().resolve("https://cdn.example/7.jpg").unwrap();
        assert_eq!(absolute.host_str(), Some("cdn.example"));
    }

    #[tokio::test]
    async fn data_uris_skip_the_network() {
        let bytes = fetcher().fetch("data:image/png;base64,AAEC").await.unwrap();
        assert_eq!(bytes, vec![0, 1, 2]);
    }
}
