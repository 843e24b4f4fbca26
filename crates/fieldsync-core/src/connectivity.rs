//! Reachability tracking for the remote store.
//!
//! The platform's network signal only says whether an interface is attached,
//! so the monitor confirms reachability with a health probe and keeps the
//! result in a shared flag the sync engine reads before any remote call.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::config::RemoteConfig;
use crate::events::{EventBus, SyncEvent};
use crate::{Error, Result};

/// Shared online flag. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct Connectivity(Arc<AtomicBool>);

impl Connectivity {
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self(Arc::new(AtomicBool::new(online)))
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Store `online`, returning the previous value.
    ///
    /// Bypasses the monitor: no event is published.
    pub fn set(&self, online: bool) -> bool {
        self.0.swap(online, Ordering::SeqCst)
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Confirms that the remote endpoint actually answers.
pub trait HealthProbe: Send + Sync + 'static {
    /// `true` when the endpoint answered with a 2xx status.
    fn probe(&self) -> impl Future<Output = bool> + Send;
}

/// Probe issuing a `GET` against a health endpoint.
#[derive(Clone)]
pub struct HttpHealthProbe {
    url: String,
    api_key: Option<String>,
    client: Client,
}

impl std::fmt::Debug for HttpHealthProbe {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpHealthProbe")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl HttpHealthProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;
        Ok(Self {
            url: url.into(),
            api_key: None,
            client,
        })
    }

    /// Probe the configured health URL, authenticating with the anon key.
    pub fn from_config(config: &RemoteConfig, timeout: Duration) -> Result<Self> {
        let mut probe = Self::new(config.health_url()?, timeout)?;
        probe.api_key.clone_from(&config.supabase_anon_key);
        Ok(probe)
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl HealthProbe for HttpHealthProbe {
    async fn probe(&self) -> bool {
        let mut request = self
            .client
            .get(&self.url)
            .header("Cache-Control", "no-store");
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let reachable = response.status().is_success();
                if !reachable {
                    tracing::debug!(status = %response.status(), "Health probe failed");
                }
                reachable
            }
            Err(error) => {
                tracing::debug!("Health probe error: {error}");
                false
            }
        }
    }
}

/// Result of applying a connectivity observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    WentOnline,
    WentOffline,
}

impl Transition {
    /// Whether the caller should start a sync cycle.
    #[must_use]
    pub const fn became_online(self) -> bool {
        matches!(self, Self::WentOnline)
    }
}

/// Turns probe results and platform hints into connectivity transitions.
pub struct ConnectivityMonitor<P> {
    probe: P,
    connectivity: Connectivity,
    events: EventBus,
}

impl<P: HealthProbe> ConnectivityMonitor<P> {
    /// Start from the platform's hint; the first [`check`](Self::check) corrects it.
    pub fn new(probe: P, connectivity: Connectivity, events: EventBus, platform_hint: bool) -> Self {
        connectivity.set(platform_hint);
        Self {
            probe,
            connectivity,
            events,
        }
    }

    #[must_use]
    pub const fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Probe the endpoint and publish a change if the result differs.
    pub async fn check(&self) -> Transition {
        let online = self.probe.probe().await;
        self.apply(online)
    }

    /// React to the platform network signal.
    ///
    /// Losing the interface forces offline without probing; regaining it only
    /// triggers a probe, since an attached interface proves nothing.
    pub async fn platform_changed(&self, attached: bool) -> Transition {
        if attached {
            self.check().await
        } else {
            self.apply(false)
        }
    }

    fn apply(&self, online: bool) -> Transition {
        let previous = self.connectivity.set(online);
        if previous == online {
            return Transition::Unchanged;
        }

        tracing::info!(
            "Connectivity changed: {}",
            if online { "ONLINE" } else { "OFFLINE" }
        );
        self.events.publish(SyncEvent::ConnectivityChanged { online });
        if online {
            Transition::WentOnline
        } else {
            Transition::WentOffline
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::AtomicU64;

    /// Probe answering whatever the test last set, after an optional delay.
    #[derive(Clone, Default)]
    pub struct FakeProbe {
        reachable: Arc<AtomicBool>,
        delay_ms: Arc<AtomicU64>,
    }

    impl FakeProbe {
        pub fn new(reachable: bool) -> Self {
            let probe = Self::default();
            probe.set(reachable);
            probe
        }

        pub fn set(&self, reachable: bool) {
            self.reachable.store(reachable, Ordering::SeqCst);
        }

        pub fn set_delay(&self, delay: Duration) {
            let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            self.delay_ms.store(millis, Ordering::SeqCst);
        }
    }

    impl HealthProbe for FakeProbe {
        async fn probe(&self) -> bool {
            let delay = self.delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            self.reachable.load(Ordering::SeqCst)
        }
    }
}
