//! Hand-written fakes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_core::{
    SyncError,
    channel::{Link, PushTransport},
    enrichment::{AssetFetcher, EnrichmentError},
    error::Result,
    poll::PollSource,
};
use dispatch_model::{
    DutyStatus, Incident, IncidentStatus, Listing, Personnel, Post,
};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use tokio::sync::mpsc;

pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_714_557_600, 0).unwrap()
}

/// Server side of one scripted push session.
#[derive(Debug)]
pub struct Peer {
    pub to_client: mpsc::Sender<String>,
    pub from_client: mpsc::Receiver<String>,
}

impl Peer {
    pub async fn push(&self, event: &str, data: serde_json::Value) {
        let frame = serde_json::json!({ "event": event, "data": data });
        self.to_client.send(frame.to_string()).await.unwrap();
    }
}

/// Transport that hands out queued sessions and refuses once they run out.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    sessions: Mutex<VecDeque<Link>>,
    pub opens: AtomicUsize,
}

impl ScriptedTransport {
    pub fn queue_session(&self) -> Peer {
        let (link, to_client, from_client) = Link::pair(32);
        self.sessions.lock().push_back(link);
        Peer {
            to_client,
            from_client,
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn open(&self) -> Result<Link> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .lock()
            .pop_front()
            .ok_or_else(|| SyncError::Transport("connection refused".into()))
    }
}

/// Poll source serving whatever the test last stored. Requests can be made
/// to hang or fail.
#[derive(Debug, Default)]
pub struct FakePollSource {
    pub incidents: Mutex<Vec<Incident>>,
    pub personnel: Mutex<Vec<Personnel>>,
    pub posts: Mutex<Vec<Post>>,
    pub hang: AtomicBool,
    pub fail: AtomicBool,
    pub incident_calls: AtomicUsize,
    pub post_calls: AtomicUsize,
}

impl FakePollSource {
    pub fn incident_calls(&self) -> usize {
        self.incident_calls.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> Result<()> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::Transport("503 from fake".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PollSource for FakePollSource {
    async fn incidents(
        &self,
        _statuses: &[IncidentStatus],
        _limit: usize,
    ) -> Result<Listing<Incident>> {
        self.incident_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        Ok(Listing::Bare(self.incidents.lock().clone()))
    }

    async fn personnel(
        &self,
        _statuses: &[DutyStatus],
    ) -> Result<Listing<Personnel>> {
        self.gate().await?;
        Ok(Listing::Wrapped {
            data: self.personnel.lock().clone(),
            total: None,
        })
    }

    async fn posts(&self) -> Result<Listing<Post>> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        Ok(Listing::Bare(self.posts.lock().clone()))
    }
}

#[derive(Debug, Default)]
pub struct NoAssets;

#[async_trait]
impl AssetFetcher for NoAssets {
    async fn fetch(&self, _: &str) -> std::result::Result<Vec<u8>, EnrichmentError> {
        Err(EnrichmentError::Network("no assets in tests".into()))
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
