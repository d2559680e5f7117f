//! Background data refresh system
//!
//! Periodically re-fetches the slow-changing portal datasets with the
//! administrative token and stores them in the `CacheManager`. One cycle runs as
//! soon as the worker starts, then one per interval until it is stopped.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::{has_data, CacheManager};
use crate::data::extract_classes;
use crate::upstream::{ListingsQuery, PortalApi, UpstreamError};

/// Default time between refresh cycles
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

/// How long `stop` waits for the worker to exit
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether per-class skill catalogs are refreshed in the background
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkillsPrefetch {
    /// Skills are fetched only on demand, with the requesting user's token
    #[default]
    OnDemand,
    /// Skills are refreshed for every class named in the item catalog
    FromCatalog,
}

/// Configuration for the refresh worker
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Time between the end of one cycle and the start of the next
    pub interval: Duration,
    /// Upper bound on how long `stop` waits for the worker
    pub stop_timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REFRESH_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// A dataset refreshed by the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dataset {
    Items,
    Shaders,
    Backs,
    Chests,
    /// First page of marketplace listings, unfiltered
    MarketOverview,
    Skills(String),
}

impl Dataset {
    /// Datasets refreshed every cycle, in fetch order
    pub fn core() -> [Dataset; 5] {
        [
            Dataset::Items,
            Dataset::Shaders,
            Dataset::Backs,
            Dataset::Chests,
            Dataset::MarketOverview,
        ]
    }

    /// Cache key the dataset is stored under
    pub fn cache_key(&self) -> String {
        match self {
            Dataset::Items => "items".to_string(),
            Dataset::Shaders => "shaders".to_string(),
            Dataset::Backs => "backs".to_string(),
            Dataset::Chests => "chests".to_string(),
            Dataset::MarketOverview => "listings:page1".to_string(),
            Dataset::Skills(class) => format!("skills:{}", class),
        }
    }

    /// Fetches the dataset with the administrative credential
    pub async fn fetch(&self, api: &dyn PortalApi) -> Result<serde_json::Value, UpstreamError> {
        match self {
            Dataset::Items => api.fetch_items().await,
            Dataset::Shaders => api.fetch_shaders().await,
            Dataset::Backs => api.fetch_backs().await,
            Dataset::Chests => api.fetch_chests().await,
            Dataset::MarketOverview => api.fetch_listings(&ListingsQuery::default()).await,
            Dataset::Skills(class) => api.fetch_skills(class).await,
        }
    }

    /// Whether a successful answer carries something worth caching
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        match self {
            Dataset::Skills(_) => value.get("skills").is_some_and(has_data),
            _ => has_data(value),
        }
    }
}

/// Outcome of one refresh cycle, by cache key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Keys written to the cache
    pub refreshed: Vec<String>,
    /// Keys whose fetch failed
    pub failed: Vec<String>,
    /// Keys whose fetch succeeded without usable data
    pub empty: Vec<String>,
    /// Set when the cycle was skipped because no admin token is configured
    pub missing_credential: bool,
}

/// Runs refresh cycles against a portal and a cache
pub struct Refresher {
    api: Arc<dyn PortalApi>,
    cache: CacheManager,
    skills: SkillsPrefetch,
    /// Classes whose skills the portal refuses for the admin token
    unsupported_skills: Mutex<HashSet<String>>,
}

impl Refresher {
    pub fn new(api: Arc<dyn PortalApi>, cache: CacheManager, skills: SkillsPrefetch) -> Self {
        Self {
            api,
            cache,
            skills,
            unsupported_skills: Mutex::new(HashSet::new()),
        }
    }

    /// Fetches every dataset once
    ///
    /// Failures are logged and recorded per key; they never stop the remaining
    /// datasets from being fetched.
    pub async fn run_cycle(&self) -> CycleReport {
        info!("Starting data refresh cycle...");
        let mut report = CycleReport::default();

        for dataset in Dataset::core() {
            if !self.refresh(&dataset, &mut report).await {
                return report;
            }
        }

        if self.skills == SkillsPrefetch::FromCatalog {
            self.refresh_skills(&mut report).await;
        }

        info!(
            "Data refresh complete. Refreshed: {}",
            report.refreshed.join(", ")
        );
        report
    }

    /// Classes skipped because the portal answered not-found for them
    pub fn unsupported_skills(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.unsupported_skills.lock().iter().cloned().collect();
        classes.sort();
        classes
    }

    async fn refresh_skills(&self, report: &mut CycleReport) {
        let Some(catalog) = self.cache.get("items", None) else {
            warn!("No item catalog available; skipping skills refresh");
            return;
        };

        for class in extract_classes(&catalog) {
            if self.unsupported_skills.lock().contains(&class) {
                debug!("Skipping skills for {}: not served for the admin token", class);
                continue;
            }
            if !self.refresh(&Dataset::Skills(class), report).await {
                return;
            }
        }
    }

    /// Fetches and stores one dataset; returns false when the cycle must end
    async fn refresh(&self, dataset: &Dataset, report: &mut CycleReport) -> bool {
        let key = dataset.cache_key();

        match dataset.fetch(self.api.as_ref()).await {
            Ok(value) if dataset.accepts(&value) => {
                self.cache.set(&key, value);
                report.refreshed.push(key);
            }
            Ok(_) => {
                warn!("No data returned for {}", key);
                report.empty.push(key);
            }
            Err(UpstreamError::MissingCredential) => {
                warn!("RPG_TOKEN not set - skipping refresh cycle");
                report.missing_credential = true;
                return false;
            }
            Err(e) => {
                if let Dataset::Skills(class) = dataset {
                    if e.is_not_found() {
                        warn!("Skills not available for {} with the admin token", class);
                        self.unsupported_skills.lock().insert(class.clone());
                    }
                }
                error!("Error fetching {}: {}", key, e);
                report.failed.push(key);
            }
        }
        true
    }
}

struct Worker {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// Handle for controlling the background refresh worker
///
/// At most one worker runs per handle. Dropping the handle also stops the
/// worker at its next wait.
pub struct RefreshHandle {
    refresher: Arc<Refresher>,
    config: RefreshConfig,
    worker: Mutex<Option<Worker>>,
}

impl RefreshHandle {
    pub fn new(refresher: Refresher, config: RefreshConfig) -> Self {
        Self {
            refresher: Arc::new(refresher),
            config,
            worker: Mutex::new(None),
        }
    }

    pub fn refresher(&self) -> &Arc<Refresher> {
        &self.refresher
    }

    /// Spawns the worker onto the current Tokio runtime
    ///
    /// Returns false without doing anything if a worker is still alive.
    pub fn start(&self) -> bool {
        let mut slot = self.worker.lock();
        if slot.as_ref().is_some_and(|w| !w.task.is_finished()) {
            debug!("Background refresh already running");
            return false;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_worker(
            Arc::clone(&self.refresher),
            self.config.interval,
            shutdown_rx,
        ));
        *slot = Some(Worker {
            shutdown: Some(shutdown_tx),
            task,
        });
        info!("Data cache background refresh started");
        true
    }

    /// Whether a worker is alive
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.task.is_finished())
    }

    /// Signals the worker and waits, up to the stop timeout, for it to exit
    ///
    /// A cycle already in flight is not interrupted. Returns false if the worker
    /// was still busy when the timeout elapsed; it will exit after that cycle.
    pub async fn stop(&self) -> bool {
        let Some(mut worker) = self.worker.lock().take() else {
            return true;
        };

        if let Some(shutdown) = worker.shutdown.take() {
            let _ = shutdown.send(());
        }

        match tokio::time::timeout(self.config.stop_timeout, &mut worker.task).await {
            Ok(_) => {
                info!("Data cache background refresh stopped");
                true
            }
            Err(_) => {
                warn!(
                    "Refresh worker still busy after {:?}; it will exit after the current cycle",
                    self.config.stop_timeout
                );
                *self.worker.lock() = Some(worker);
                false
            }
        }
    }
}

async fn run_worker(
    refresher: Arc<Refresher>,
    interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    info!("Background refresh worker started");

    loop {
        refresher.run_cycle().await;

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = &mut shutdown => break,
        }
    }

    info!("Background refresh worker stopped");
}
