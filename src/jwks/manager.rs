//! The key-set manager: hot-path key resolution plus the background
//! refresh controller.
//!
//! One manager owns one snapshot, one controller task, and one capacity-1
//! channel of refresh requests. The channel capacity is the coalescing
//! mechanism: while a request is queued, further requests are dropped, so
//! a flood of unknown kids can never amplify into unbounded refresh
//! pressure on the endpoints.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RefreshPolicy;
use crate::error::{AuthError, FetchError};

use super::fetcher::JwksFetcher;
use super::key::KeyEntry;
use super::store::{KeyStore, Snapshot};

/// Invoked with the freshly published snapshot after a successful refresh.
pub type RefreshSuccessHandler = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// Invoked with the fetch error when a refresh fails.
pub type RefreshErrorHandler = Arc<dyn Fn(&FetchError) + Send + Sync>;

/// A queued refresh request.
///
/// The sender, when present, belongs to a hot-path waiter. It is dropped
/// once the refresh this request was folded into has completed, waking the
/// waiter whether the refresh succeeded or not.
struct RefreshRequest {
    done: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct RateState {
    last_refresh: Option<Instant>,
    queued: bool,
}

/// A concurrent, self-refreshing cache of JWKS verification keys.
pub struct KeySetManager {
    store: KeyStore,
    fetcher: JwksFetcher,
    policy: RefreshPolicy,
    cancel: CancellationToken,
    refresh_tx: mpsc::Sender<RefreshRequest>,
    rate: Mutex<RateState>,
    on_success: Option<RefreshSuccessHandler>,
    on_error: Option<RefreshErrorHandler>,
}

impl std::fmt::Debug for KeySetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySetManager")
            .field("policy", &self.policy)
            .finish()
    }
}

impl KeySetManager {
    /// Build the manager, run the initial refresh, and spawn the refresh
    /// controller.
    ///
    /// The initial fetch happens before the controller exists, so a dead
    /// or misconfigured endpoint fails construction instead of serving an
    /// empty key set.
    pub(crate) async fn start(
        fetcher: JwksFetcher,
        policy: RefreshPolicy,
        on_success: Option<RefreshSuccessHandler>,
        on_error: Option<RefreshErrorHandler>,
    ) -> Result<Arc<Self>, AuthError> {
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let manager = Arc::new(Self {
            store: KeyStore::new(),
            fetcher,
            policy,
            cancel: CancellationToken::new(),
            refresh_tx,
            rate: Mutex::new(RateState::default()),
            on_success,
            on_error,
        });

        let initial = manager.fetcher.fetch_all(&manager.cancel).await?;
        manager.store.swap(Arc::new(initial)).await;
        manager.rate.lock().await.last_refresh = Some(Instant::now());

        tokio::spawn(Arc::clone(&manager).run(refresh_rx));
        Ok(manager)
    }

    /// Look up the verification key entry for `kid`.
    ///
    /// On a miss with `refresh_on_unknown_kid` enabled, at most one
    /// refresh request is queued and awaited; if another refresh is
    /// already pending, or the manager is shutting down, the miss is
    /// returned immediately.
    pub async fn resolve(&self, kid: &str) -> Result<Arc<KeyEntry>, AuthError> {
        if let Some(entry) = self.store.get(kid).await {
            return Ok(entry);
        }

        if !self.policy.refresh_on_unknown_kid || self.cancel.is_cancelled() {
            return Err(AuthError::UnknownKid {
                kid: kid.to_owned(),
            });
        }

        let (done_tx, done_rx) = oneshot::channel();
        match self.refresh_tx.try_send(RefreshRequest {
            done: Some(done_tx),
        }) {
            Ok(()) => {
                // Wakes when the refresh completes or the controller shuts
                // down and drops the queued request.
                let _ = done_rx.await;
            }
            // Full: a refresh is already pending and this request is
            // folded into it without waiting. Closed: shutdown.
            Err(_) => {
                return Err(AuthError::UnknownKid {
                    kid: kid.to_owned(),
                })
            }
        }

        match self.store.get(kid).await {
            Some(entry) => Ok(entry),
            None => Err(AuthError::UnknownKid {
                kid: kid.to_owned(),
            }),
        }
    }

    /// The currently published snapshot.
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.store.current().await
    }

    /// Cancel the refresh controller.
    ///
    /// In-flight downloads are aborted and hot-path waiters are released;
    /// they observe the last published snapshot.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    async fn run(self: Arc<Self>, mut requests: mpsc::Receiver<RefreshRequest>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval_tick(self.policy.interval) => {
                    // Nobody waits on interval refreshes; if a request is
                    // already queued this one coalesces into it.
                    let _ = self.refresh_tx.try_send(RefreshRequest { done: None });
                }
                request = requests.recv() => match request {
                    Some(request) => Arc::clone(&self).service(request).await,
                    None => break,
                },
            }
        }
        debug!("JWK Set refresh controller stopped");
    }

    async fn service(self: Arc<Self>, request: RefreshRequest) {
        let mut rate = self.rate.lock().await;

        if let (Some(limit), Some(last)) = (self.policy.rate_limit, rate.last_refresh) {
            let next_allowed = last + limit;
            if Instant::now() < next_allowed {
                // Inside the rate-limit window the waiter is released
                // immediately; the hot path must not block on keys that
                // cannot arrive before the window opens.
                drop(request.done);

                if !rate.queued {
                    rate.queued = true;
                    let manager = Arc::clone(&self);
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = manager.cancel.cancelled() => return,
                            _ = tokio::time::sleep_until(next_allowed) => {}
                        }
                        let mut rate = manager.rate.lock().await;
                        manager.refresh_once().await;
                        rate.last_refresh = Some(Instant::now());
                        rate.queued = false;
                    });
                }
                return;
            }
        }

        self.refresh_once().await;
        rate.last_refresh = Some(Instant::now());
        // Dropping the request here releases its waiter onto the fresh
        // snapshot.
    }

    /// Run one refresh and publish or report the result.
    async fn refresh_once(&self) {
        match self.fetcher.fetch_all(&self.cancel).await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.store.swap(Arc::clone(&snapshot)).await;
                debug!(keys = snapshot.len(), "published refreshed JWK Set");
                if let Some(on_success) = &self.on_success {
                    on_success(&snapshot);
                }
            }
            Err(err) => {
                // The previous snapshot stays in place.
                match &self.on_error {
                    Some(on_error) => on_error(&err),
                    None => warn!(error = %err, "JWK Set refresh failed"),
                }
            }
        }
    }
}

async fn interval_tick(interval: Option<Duration>) {
    match interval {
        Some(period) => tokio::time::sleep(period).await,
        None => std::future::pending::<()>().await,
    }
}
