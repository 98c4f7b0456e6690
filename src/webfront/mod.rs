//! Web-front status client.
//!
//! Fetches the per-instance list of connected player names from the
//! web-front HTTP API. A short TTL cache coalesces the bursty lookups the
//! processing loops produce. Transport problems and non-2xx responses all
//! collapse to an empty list; callers treat "no data" as "assume joined".

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::future::LocalBoxFuture;
use log::{debug, warn};
use serde::Deserialize;

pub const STATUS_CACHE_TTL: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One game server as the web-front reports it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceServerStatus {
    pub listen_address: String,
    pub listen_port: u16,
    #[serde(default)]
    pub players: Vec<StatusPlayer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusPlayer {
    pub name: String,
}

/// Status capability the queueing service depends on; tests script it.
pub trait InstanceStatusSource: Send + Sync {
    fn instance_status(&self, instance_id: &str) -> LocalBoxFuture<'static, Vec<InstanceServerStatus>>;
}

struct CacheEntry {
    fetched_at: Instant,
    statuses: Vec<InstanceServerStatus>,
}

/// TTL cache over instance status responses.
struct StatusCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl StatusCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, instance_id: &str, now: Instant) -> Option<Vec<InstanceServerStatus>> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(instance_id)
            .filter(|entry| now.duration_since(entry.fetched_at) < self.ttl)
            .map(|entry| entry.statuses.clone())
    }

    fn put(&self, instance_id: &str, statuses: Vec<InstanceServerStatus>, now: Instant) {
        self.entries.lock().unwrap().insert(
            instance_id.to_string(),
            CacheEntry {
                fetched_at: now,
                statuses,
            },
        );
    }
}

pub struct WebfrontClient {
    base_url: String,
    cache: Arc<StatusCache>,
}

impl WebfrontClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: Arc::new(StatusCache::new(STATUS_CACHE_TTL)),
        }
    }

    fn status_url(&self, instance_id: &str) -> String {
        format!(
            "{}/api/status?instance={}",
            self.base_url,
            urlencoding::encode(instance_id)
        )
    }
}

impl InstanceStatusSource for WebfrontClient {
    fn instance_status(&self, instance_id: &str) -> LocalBoxFuture<'static, Vec<InstanceServerStatus>> {
        if let Some(cached) = self.cache.get(instance_id, Instant::now()) {
            return Box::pin(async move { cached });
        }
        let url = self.status_url(instance_id);
        let instance_id = instance_id.to_string();
        let cache = Arc::clone(&self.cache);
        Box::pin(async move {
            let statuses = fetch_statuses(&url).await;
            debug!(
                "[Webfront] instance={} -> {} server entries",
                instance_id,
                statuses.len()
            );
            cache.put(&instance_id, statuses.clone(), Instant::now());
            statuses
        })
    }
}

async fn fetch_statuses(url: &str) -> Vec<InstanceServerStatus> {
    let client = awc::Client::default();
    let mut response = match client.get(url).timeout(REQUEST_TIMEOUT).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("[Webfront] GET {} failed: {}", url, e);
            return Vec::new();
        }
    };
    if !response.status().is_success() {
        warn!("[Webfront] GET {} -> {}", url, response.status());
        return Vec::new();
    }
    match response.json::<Vec<InstanceServerStatus>>().await {
        Ok(statuses) => statuses,
        Err(e) => {
            warn!("[Webfront] GET {} returned malformed JSON: {}", url, e);
            Vec::new()
        }
    }
}
