// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::catalog::{Readiness, UnavailableError};
use crate::navigator::{ActiveCity, Navigator};
use crate::poi::{Poi, PoiError};
use crate::route::{RouteError, RouteResult};
use crate::Coordinate;

/// Destinations closer than roughly a meter are considered the same.
const DESTINATION_PRECISION: f64 = 1e5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DestinationKey(i64, i64);

impl DestinationKey {
    fn new(at: Coordinate) -> Self {
        Self(
            (at.lat * DESTINATION_PRECISION).round() as i64,
            (at.lon * DESTINATION_PRECISION).round() as i64,
        )
    }
}

/// Waits for a blocking task, propagating its panics to the caller.
/// Returns `None` if the task was cancelled, which happens when the runtime
/// shuts down before the task got to run.
async fn join<T>(task: JoinHandle<T>) -> Option<T> {
    match task.await {
        Ok(value) => Some(value),
        Err(e) => match e.try_into_panic() {
            Ok(panic) => std::panic::resume_unwind(panic),
            Err(e) => {
                log::debug!("blocking task did not run: {e}");
                None
            }
        },
    }
}

/// Runs a blocking closure on tokio's blocking thread pool, see [join].
async fn blocking<T, F>(f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    join(tokio::task::spawn_blocking(f)).await
}

/// Asynchronous front of a [Navigator].
///
/// Loads, searches and route queries run on the blocking thread pool, so callers
/// on the async runtime never wait on file IO or graph search.
/// A route request supersedes any pending request to the same destination:
/// the older one is cancelled and resolves to [RouteError::Superseded].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    navigator: Arc<Navigator>,
    pending: Arc<Mutex<HashMap<DestinationKey, (u64, CancellationToken)>>>,
    next_ticket: Arc<AtomicU64>,
}

impl Dispatcher {
    pub fn new(navigator: Arc<Navigator>) -> Self {
        Self {
            navigator,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_ticket: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn navigator(&self) -> &Arc<Navigator> {
        &self.navigator
    }

    /// Registers a new request to `key`, cancelling the previous one.
    fn begin(&self, key: DestinationKey) -> (u64, CancellationToken) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let previous = self.pending.lock().insert(key, (ticket, token.clone()));
        if let Some((previous, previous_token)) = previous {
            log::debug!("route request {ticket} supersedes {previous}");
            previous_token.cancel();
        }

        (ticket, token)
    }

    /// Forgets a request, unless a newer request to the same destination replaced it.
    fn finish(&self, key: DestinationKey, ticket: u64) {
        let mut pending = self.pending.lock();
        if pending.get(&key).is_some_and(|(t, _)| *t == ticket) {
            pending.remove(&key);
        }
    }

    /// Finds a route in the active city.
    ///
    /// Returns [RouteError::Superseded] if another request to the same destination
    /// was made before this one completed.
    pub async fn route(
        &self,
        start: Coordinate,
        destination: Coordinate,
    ) -> Result<RouteResult, RouteError> {
        self.run_route(destination, move |navigator, interrupt| {
            navigator.query_interruptible(start, destination, interrupt)
        })
        .await
    }

    /// Registers a route request to `destination`, and runs `query` on the blocking
    /// thread pool with a callback telling whether the request was superseded.
    async fn run_route<F>(
        &self,
        destination: Coordinate,
        query: F,
    ) -> Result<RouteResult, RouteError>
    where
        F: FnOnce(&Navigator, &dyn Fn() -> bool) -> Result<RouteResult, RouteError>
            + Send
            + 'static,
    {
        let key = DestinationKey::new(destination);
        let (ticket, token) = self.begin(key);

        let navigator = self.navigator.clone();
        let interrupt = token.clone();
        let result = blocking(move || query(&*navigator, &|| interrupt.is_cancelled()))
            .await
            .unwrap_or(Err(RouteError::Interrupted));

        self.finish(key, ticket);

        if token.is_cancelled() {
            log::debug!("discarding superseded route request {ticket} to {destination}");
            return Err(RouteError::Superseded);
        }
        result
    }

    /// Cancels a pending route request to the given destination.
    /// Returns false if there was none.
    pub fn cancel(&self, destination: Coordinate) -> bool {
        match self.pending.lock().remove(&DestinationKey::new(destination)) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels all pending route requests.
    pub fn cancel_all(&self) {
        for (_, (_, token)) in self.pending.lock().drain() {
            token.cancel();
        }
    }

    /// See [Navigator::resolve_and_load].
    pub async fn resolve_and_load(&self, city: &str) -> Result<Arc<ActiveCity>, UnavailableError> {
        let navigator = self.navigator.clone();
        let city = city.to_string();
        let interrupted = UnavailableError::Interrupted { city: city.clone() };
        blocking(move || navigator.resolve_and_load(&city))
            .await
            .unwrap_or(Err(interrupted))
    }

    /// See [Navigator::search].
    pub async fn search(&self, text: &str) -> Result<Vec<Poi>, PoiError> {
        let navigator = self.navigator.clone();
        let text = text.to_string();
        blocking(move || navigator.search(&text))
            .await
            .unwrap_or(Err(PoiError::Interrupted))
    }

    /// See [Navigator::readiness].
    pub async fn readiness(&self, city: &str) -> Result<Readiness, UnavailableError> {
        let navigator = self.navigator.clone();
        let city = city.to_string();
        let interrupted = UnavailableError::Interrupted { city: city.clone() };
        blocking(move || navigator.readiness(&city))
            .await
            .unwrap_or(Err(interrupted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::{testing, Catalog, RouteOptions};

    fn setup() -> (tempfile::TempDir, Dispatcher) {
        let dir = tempfile::tempdir().unwrap();
        testing::write_bundle(dir.path(), "Paris", &testing::grid_network(40, 40));
        let catalog = Catalog::new(dir.path(), &["Paris"]);
        let navigator = Navigator::with_catalog(catalog, RouteOptions::default());
        (dir, Dispatcher::new(Arc::new(navigator)))
    }

    const START: Coordinate = Coordinate::new(52.0, 21.0);

    fn corner() -> Coordinate {
        Coordinate::new(52.0 + 39.0 * 0.001, 21.0 + 39.0 * 0.0015)
    }

    #[test]
    fn destination_keys() {
        let a = DestinationKey::new(Coordinate::new(52.123451, 21.0));
        let b = DestinationKey::new(Coordinate::new(52.1234512, 21.0));
        let c = DestinationKey::new(Coordinate::new(52.12346, 21.0));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn load_and_route() {
        let (_dir, dispatcher) = setup();
        assert_eq!(
            dispatcher.route(START, corner()).await,
            Err(RouteError::NotLoaded)
        );

        dispatcher.resolve_and_load("paris").await.unwrap();
        let route = dispatcher.route(START, corner()).await.unwrap();
        assert_eq!(route.coordinates.last(), Some(&corner()));
        assert!(dispatcher.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn unsupported_city() {
        let (_dir, dispatcher) = setup();
        let err = dispatcher.resolve_and_load("Berlin").await.unwrap_err();
        assert_eq!(err.reason(), "not_supported");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn superseded_request_is_discarded() {
        let (_dir, dispatcher) = setup();
        dispatcher.resolve_and_load("Paris").await.unwrap();

        // The first request keeps running until a newer one cancels it
        let d = dispatcher.clone();
        let first = tokio::spawn(async move {
            d.run_route(corner(), |navigator, interrupt| {
                while !interrupt() {
                    std::thread::sleep(Duration::from_millis(1));
                }
                navigator.query_interruptible(START, corner(), interrupt)
            })
            .await
        });

        let key = DestinationKey::new(corner());
        while !dispatcher.pending.lock().contains_key(&key) {
            tokio::task::yield_now().await;
        }

        let second = dispatcher.route(Coordinate::new(52.001, 21.0), corner()).await;
        assert!(second.is_ok());
        assert_eq!(first.await.unwrap(), Err(RouteError::Superseded));
        assert!(dispatcher.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn cancelled_request_is_not_delivered() {
        let (_dir, dispatcher) = setup();
        dispatcher.resolve_and_load("Paris").await.unwrap();

        let key = DestinationKey::new(corner());
        let (ticket, token) = dispatcher.begin(key);
        assert!(dispatcher.cancel(corner()));
        assert!(token.is_cancelled());
        assert!(!dispatcher.cancel(corner()));
        dispatcher.finish(key, ticket);

        let (_, a) = dispatcher.begin(key);
        let (_, b) = dispatcher.begin(DestinationKey::new(START));
        dispatcher.cancel_all();
        assert!(a.is_cancelled() && b.is_cancelled());
    }

    #[tokio::test]
    async fn concurrent_route_to_same_destination() {
        let (_dir, dispatcher) = setup();
        dispatcher.resolve_and_load("Paris").await.unwrap();

        let d1 = dispatcher.clone();
        let d2 = dispatcher.clone();
        let first = tokio::spawn(async move { d1.route(START, corner()).await });
        let second = tokio::spawn(async move { d2.route(START, corner()).await });
        let results = [first.await.unwrap(), second.await.unwrap()];

        // At least one is delivered; anything not delivered was superseded, never stale
        assert!(results.iter().any(|r| r.is_ok()));
        for r in &results {
            assert!(r.is_ok() || *r == Err(RouteError::Superseded));
        }
    }

    #[test]
    fn blocking_task_cancelled_by_shutdown() {
        let pool = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let handle = pool.handle().clone();
        pool.shutdown_background();

        // Tasks spawned onto a runtime which is shutting down never run
        let task = handle.spawn_blocking(|| 42);
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        assert_eq!(rt.block_on(join(task)), None);
    }

    #[tokio::test]
    async fn search_and_readiness() {
        let (_dir, dispatcher) = setup();
        let found = dispatcher.search("golden").await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(dispatcher.readiness("paris").await.unwrap().is_ready());
    }
}
