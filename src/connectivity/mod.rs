//! Network reachability monitor
//!
//! Combines pushed status reports with periodic probing. A probe that fails
//! is reported as not connected so the orchestrator never attempts an online
//! call on an unknown link.

use crate::config::ConnectivityConfig;
use crate::error::AssistError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reachability snapshot
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConnectivityStatus {
    pub is_connected: bool,
    /// Link type label, when the platform reports one
    pub kind: Option<String>,
}

impl ConnectivityStatus {
    pub fn connected(kind: impl Into<String>) -> Self {
        Self {
            is_connected: true,
            kind: Some(kind.into()),
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }
}

/// Probe errors
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Probe timed out")]
    Timeout,

    #[error("Probe request failed: {0}")]
    Request(String),
}

impl From<ProbeError> for AssistError {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::Timeout => AssistError::NetworkTimeout("reachability probe".to_string()),
            ProbeError::Request(msg) => AssistError::RemoteFailed(msg),
        }
    }
}

/// Platform reachability query
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self) -> Result<ConnectivityStatus, ProbeError>;
}

/// Probe that issues a short GET; any HTTP response counts as reachable
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(config: &ConnectivityConfig) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout())
            .build()
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        Ok(Self {
            client,
            url: config.probe_url.clone(),
        })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self) -> Result<ConnectivityStatus, ProbeError> {
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout
            } else {
                ProbeError::Request(e.to_string())
            }
        })?;

        debug!("Probe answered with status {}", response.status());
        Ok(ConnectivityStatus::connected("http"))
    }
}

type ChangeCallback = Arc<dyn Fn(&ConnectivityStatus) + Send + Sync>;

/// Tracks the current status and fans out transitions
pub struct ConnectivityMonitor {
    probe: Arc<dyn ReachabilityProbe>,
    sender: watch::Sender<ConnectivityStatus>,
    callbacks: Mutex<Vec<ChangeCallback>>,
}

impl ConnectivityMonitor {
    /// Starts disconnected until the first probe or report
    pub fn new(probe: Arc<dyn ReachabilityProbe>) -> Self {
        let (sender, _) = watch::channel(ConnectivityStatus::disconnected());
        Self {
            probe,
            sender,
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn current_status(&self) -> ConnectivityStatus {
        self.sender.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.sender.borrow().is_connected
    }

    /// Register a callback invoked on every transition
    pub fn on_change(&self, callback: impl Fn(&ConnectivityStatus) + Send + Sync + 'static) {
        self.callbacks.lock().push(Arc::new(callback));
    }

    /// Receiver that observes every published status
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
        self.sender.subscribe()
    }

    /// Publish a status pushed by the platform
    ///
    /// Returns true when it differed from the previous status.
    pub fn report(&self, status: ConnectivityStatus) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status.clone();
                true
            }
        });

        if changed {
            info!(connected = status.is_connected, kind = ?status.kind, "Connectivity changed");
            let callbacks: Vec<ChangeCallback> = self.callbacks.lock().clone();
            for callback in callbacks {
                callback(&status);
            }
        }

        changed
    }

    /// Probe now and publish the result
    pub async fn refresh(&self) -> ConnectivityStatus {
        let status = match self.probe.probe().await {
            Ok(status) => status,
            Err(e) => {
                warn!("Reachability probe failed, treating as offline: {}", e);
                ConnectivityStatus::disconnected()
            }
        };
        self.report(status.clone());
        status
    }

    /// Probe on a fixed interval until `shutdown` fires
    pub fn spawn_polling(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Connectivity polling stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.refresh().await;
                    }
                }
            }
        })
    }
}
