use crate::error::Result;

use async_trait::async_trait;
use dispatch_model::{
    DutyStatus, Incident, IncidentStatus, Listing, Personnel, Post,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::debug;
use url::Url;

/// Snapshot endpoints polled as the consistency backstop.
#[async_trait]
pub trait PollSource: Send + Sync + fmt::Debug {
    async fn incidents(
        &self,
        statuses: &[IncidentStatus],
        limit: usize,
    ) -> Result<Listing<Incident>>;

    async fn personnel(&self, statuses: &[DutyStatus])
    -> Result<Listing<Personnel>>;

    async fn posts(&self) -> Result<Listing<Post>>;
}

/// REST implementation against `GET /api/incidents`, `/api/personnel` and
/// `/api/posts`.
#[derive(Debug, Clone)]
pub struct HttpPollSource {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpPollSource {
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

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    pub fn snapshot_url(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Url> {
        let mut url = self.endpoint(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(
                query.iter().map(|(key, value)| (*key, value.as_str())),
            );
        }
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Listing<T>> {
        let url = self.snapshot_url(path, query)?;
        debug!(%url, "polling snapshot");
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let listing = request
            .send()
            .await?
            .error_for_status()?
            .json::<Listing<T>>()
            .await?;
        Ok(listing)
    }
}

fn join_wire<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values.collect::<Vec<_>>().join(",")
}

#[async_trait]
impl PollSource for HttpPollSource {
    async fn incidents(
        &self,
        statuses: &[IncidentStatus],
        limit: usize,
    ) -> Result<Listing<Incident>> {
        let status = join_wire(statuses.iter().map(IncidentStatus::as_wire));
        self.get(
            "api/incidents",
            &[("status", status), ("limit", limit.to_string())],
        )
        .await
    }

    async fn personnel(
        &self,
        statuses: &[DutyStatus],
    ) -> Result<Listing<Personnel>> {
        let status = join_wire(statuses.iter().map(DutyStatus::as_wire));
        self.get("api/personnel", &[("status", status)]).await
    }

    async fn posts(&self) -> Result<Listing<Post>> {
        self.get("api/posts", &[]).await
    }
}
