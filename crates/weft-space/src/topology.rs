use std::sync::{Arc, Condvar, Mutex};

use tracing::{debug, warn};

use weft_types::View;

use crate::error::{SpaceError, SpaceResult};

/// Source of fresh topology snapshots. Producing a new view after a failure
/// (discovery, reconfiguration, consensus) lives outside this crate; the
/// space only consumes the result.
pub trait ViewSource: Send + Sync {
    fn fetch(&self) -> SpaceResult<View>;
}

impl<F> ViewSource for F
where
    F: Fn() -> SpaceResult<View> + Send + Sync,
{
    fn fetch(&self) -> SpaceResult<View> {
        self()
    }
}

/// Shared, read-mostly access to the current cluster view.
///
/// The view is an atomically-replaced immutable snapshot: callers clone an
/// `Arc` and can never observe a torn topology.
pub trait ViewProvider: Send + Sync {
    /// The current view, fetching one if none is cached yet.
    fn view(&self) -> SpaceResult<Arc<View>>;

    /// Discard the cached view and block until a refreshed one is
    /// available. Concurrent invalidators coalesce into a single in-flight
    /// fetch; the rest wait on it rather than issuing redundant ones.
    fn invalidate_and_wait(&self, cause: &SpaceError) -> SpaceResult<Arc<View>>;
}

/// Fixed topology for tests and single-configuration embedding. Refresh
/// hands back the same snapshot.
pub struct StaticViewProvider {
    view: Arc<View>,
}

impl StaticViewProvider {
    pub fn new(view: View) -> Self {
        Self {
            view: Arc::new(view),
        }
    }
}

impl ViewProvider for StaticViewProvider {
    fn view(&self) -> SpaceResult<Arc<View>> {
        Ok(Arc::clone(&self.view))
    }

    fn invalidate_and_wait(&self, _cause: &SpaceError) -> SpaceResult<Arc<View>> {
        Ok(Arc::clone(&self.view))
    }
}

/// Caching provider over a [`ViewSource`] with single-flight refresh.
pub struct RefreshingViewProvider {
    source: Box<dyn ViewSource>,
    state: Mutex<RefreshState>,
    refreshed: Condvar,
}

#[derive(Default)]
struct RefreshState {
    current: Option<Arc<View>>,
    /// Bumped on every completed refresh; lets waiters detect a refresh
    /// that finished after they arrived.
    generation: u64,
    in_flight: bool,
}

impl RefreshingViewProvider {
    pub fn new(source: impl ViewSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            state: Mutex::new(RefreshState::default()),
            refreshed: Condvar::new(),
        }
    }

    /// Run or wait for a refresh. `entry_generation` is the generation the
    /// caller observed when it decided the view was unusable.
    fn refresh(&self, entry_generation: u64) -> SpaceResult<Arc<View>> {
        let mut state = self.state.lock().expect("lock poisoned");
        loop {
            if state.generation > entry_generation {
                if let Some(view) = &state.current {
                    return Ok(Arc::clone(view));
                }
            }
            if state.in_flight {
                state = self.refreshed.wait(state).expect("lock poisoned");
                continue;
            }
            state.in_flight = true;
            drop(state);

            let fetched = self.source.fetch();

            state = self.state.lock().expect("lock poisoned");
            state.in_flight = false;
            match fetched {
                Ok(view) => {
                    debug!(epoch = view.epoch, "topology view refreshed");
                    let view = Arc::new(view);
                    state.current = Some(Arc::clone(&view));
                    state.generation += 1;
                    self.refreshed.notify_all();
                    return Ok(view);
                }
                Err(e) => {
                    warn!(error = %e, "topology refresh failed");
                    state.generation += 1;
                    self.refreshed.notify_all();
                    return Err(SpaceError::NoView(e.to_string()));
                }
            }
        }
    }
}

impl ViewProvider for RefreshingViewProvider {
    fn view(&self) -> SpaceResult<Arc<View>> {
        let (cached, generation) = {
            let state = self.state.lock().expect("lock poisoned");
            (state.current.clone(), state.generation)
        };
        match cached {
            Some(view) => Ok(view),
            None => self.refresh(generation),
        }
    }

    fn invalidate_and_wait(&self, cause: &SpaceError) -> SpaceResult<Arc<View>> {
        let generation = {
            let mut state = self.state.lock().expect("lock poisoned");
            state.current = None;
            state.generation
        };
        warn!(cause = %cause, "view invalidated, waiting for refresh");
        self.refresh(generation)
    }
}
