//! Asynchronous resource loading.
//!
//! A load is a job (runs on a worker thread, or inline in tests) plus a
//! continuation (runs on the UI thread). Continuations only ever run from
//! [`LoadingManager::pump`], so a request never completes re-entrantly inside
//! the call that made it.
//!
//! Every request carries a [`GenerationToken`] from the requesting component.
//! When that component is disposed its [`Generation`] advances and any
//! completion still in flight is dropped on arrival.

pub mod environment;
pub mod gltf_loader;
pub mod import;
pub mod texture;

use crate::bus::{EditorEvent, EventBus};
use crate::config::{LoaderConfig, LoaderMode};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },
    #[error("failed to decode {path}: {message}")]
    Decode { path: String, message: String },
    #[error("failed to upload {path}: {message}")]
    Upload { path: String, message: String },
    #[error("load of '{0}' stopped before it finished")]
    Aborted(String),
    #[error("load of '{0}' produced an unexpected payload")]
    PayloadMismatch(String),
}

/// Epoch counter owned by a component that issues loads.
#[derive(Debug, Default)]
pub struct Generation(Rc<Cell<u64>>);

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> GenerationToken {
        GenerationToken {
            epoch: Rc::clone(&self.0),
            value: self.0.get(),
        }
    }

    /// Invalidates every token issued so far.
    pub fn advance(&self) {
        self.0.set(self.0.get() + 1);
    }
}

#[derive(Debug, Clone)]
pub struct GenerationToken {
    epoch: Rc<Cell<u64>>,
    value: u64,
}

impl GenerationToken {
    pub fn is_current(&self) -> bool {
        self.epoch.get() == self.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

type Payload = Box<dyn Any + Send>;
type JobResult = Result<Payload, LoadError>;
type Job = Box<dyn FnOnce() + Send>;
type Continuation = Box<dyn FnOnce(JobResult)>;

struct PendingLoad {
    label: String,
    token: GenerationToken,
    on_done: Continuation,
}

/// Runs load jobs and reports aggregate progress on the bus.
pub struct LoadingManager {
    bus: Rc<EventBus>,
    pool: RefCell<Option<rayon::ThreadPool>>,
    results_tx: mpsc::Sender<(JobId, JobResult)>,
    results_rx: mpsc::Receiver<(JobId, JobResult)>,
    pending: RefCell<HashMap<JobId, PendingLoad>>,
    next_id: Cell<u64>,
    items_loaded: Cell<usize>,
    items_total: Cell<usize>,
    active: Cell<bool>,
    disposed: Cell<bool>,
}

impl LoadingManager {
    pub fn new(bus: Rc<EventBus>, config: &LoaderConfig) -> Rc<Self> {
        let pool = match config.mode {
            LoaderMode::Threaded => match rayon::ThreadPoolBuilder::new()
                .num_threads(config.workers.max(1))
                .thread_name(|index| format!("scenedit-loader-{index}"))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(err) => {
                    log::warn!("No loader workers available ({}), loading inline", err);
                    None
                }
            },
            LoaderMode::Inline => None,
        };
        let (results_tx, results_rx) = mpsc::channel();
        Rc::new(Self {
            bus,
            pool: RefCell::new(pool),
            results_tx,
            results_rx,
            pending: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
            items_loaded: Cell::new(0),
            items_total: Cell::new(0),
            active: Cell::new(false),
            disposed: Cell::new(false),
        })
    }

    /// Queue `job`; `on_done` runs from a later [`pump`](Self::pump) if `token` is still current.
    pub fn request<T, J, C>(
        &self,
        label: impl Into<String>,
        token: GenerationToken,
        job: J,
        on_done: C,
    ) -> Option<JobId>
    where
        T: Send + 'static,
        J: FnOnce() -> Result<T, LoadError> + Send + 'static,
        C: FnOnce(Result<T, LoadError>) + 'static,
    {
        let label = label.into();
        if self.disposed.get() {
            log::warn!("Ignoring load of '{}' after loading manager shutdown", label);
            return None;
        }
        let id = JobId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let mismatch_label = label.clone();
        let on_done: Continuation = Box::new(move |result: JobResult| {
            let typed = result.and_then(|payload| {
                payload
                    .downcast::<T>()
                    .map(|boxed| *boxed)
                    .map_err(|_| LoadError::PayloadMismatch(mismatch_label))
            });
            on_done(typed);
        });

        self.pending.borrow_mut().insert(
            id,
            PendingLoad {
                label: label.clone(),
                token,
                on_done,
            },
        );
        self.items_total.set(self.items_total.get() + 1);
        log::debug!("Queued load {:?} '{}'", id, label);
        if !self.active.replace(true) {
            self.bus.broadcast(EditorEvent::LoadStart);
        }

        let tx = self.results_tx.clone();
        let run: Job = Box::new(move || {
            let result = match std::panic::catch_unwind(AssertUnwindSafe(job)) {
                Ok(result) => result.map(|value| Box::new(value) as Payload),
                Err(_) => Err(LoadError::Aborted(label)),
            };
            let _ = tx.send((id, result));
        });

        match self.pool.borrow().as_ref() {
            Some(pool) => pool.spawn(run),
            None => run(),
        }
        Some(id)
    }

    /// Run continuations for every finished load. Returns how many were handled.
    pub fn pump(&self) -> usize {
        let mut handled = 0;
        while let Ok((id, result)) = self.results_rx.try_recv() {
            if self.finish(id, result) {
                handled += 1;
            }
        }
        handled
    }

    /// Block until nothing is in flight or `timeout` passes. Returns true when idle.
    pub fn pump_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.pump();
        while !self.is_idle() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.results_rx.recv_timeout(remaining) {
                Ok((id, result)) => {
                    self.finish(id, result);
                }
                Err(_) => return false,
            }
        }
        true
    }

    fn finish(&self, id: JobId, result: JobResult) -> bool {
        let Some(load) = self.pending.borrow_mut().remove(&id) else {
            return false;
        };
        self.items_loaded.set(self.items_loaded.get() + 1);

        if !load.token.is_current() {
            log::debug!("Dropping stale completion of '{}'", load.label);
        } else {
            if let Err(err) = &result {
                log::warn!("Load of '{}' failed: {}", load.label, err);
                self.bus.broadcast(EditorEvent::LoadError(err.clone()));
            }
            (load.on_done)(result);
        }

        if self.is_idle() && self.active.replace(false) {
            self.items_loaded.set(0);
            self.items_total.set(0);
            self.bus.broadcast(EditorEvent::LoadComplete);
        }
        true
    }

    pub fn in_flight(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// (finished, requested) since the last time the manager went idle.
    pub fn progress(&self) -> (usize, usize) {
        (self.items_loaded.get(), self.items_total.get())
    }

    pub fn is_threaded(&self) -> bool {
        self.pool.borrow().is_some()
    }

    /// Drop pending continuations and stop the workers. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.active.set(false);
        let dropped = self.pending.borrow_mut().drain().count();
        if dropped > 0 {
            log::debug!("Discarding {} in-flight load(s) on shutdown", dropped);
        }
        // Jobs already on the pool still finish; their results are drained unread.
        self.pool.borrow_mut().take();
        while self.results_rx.try_recv().is_ok() {}
    }
}
