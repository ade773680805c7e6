//! Single-initialization loading of the external module.
//!
//! The first `ready()` call starts the fetch; calls made while that fetch is in
//! flight queue behind it and receive the same outcome; calls made after a
//! successful load complete immediately. A failed attempt wakes every waiter
//! with the error and returns the loader to `NotStarted`, so a later call makes
//! a fresh attempt.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use futures::channel::oneshot;

use crate::error::LoadError;

/// Invoked exactly once when a fetch settles.
pub type Completion = Box<dyn FnOnce(Result<(), LoadError>)>;

/// Starts fetching and executing the external module's entry script.
///
/// Implementations must eventually call `done` exactly once. Calling it before
/// `inject` returns is allowed.
pub trait ScriptInjector {
    fn inject(&self, src: &str, done: Completion);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    NotStarted,
    Loading,
    Loaded,
}

type Waiter = Completion;

struct Inner {
    state: LoadState,
    waiters: Vec<Waiter>,
    attempts: u32,
}

/// Loads the module at a fixed location at most once. Clones share state.
pub struct ModuleLoader<I> {
    src: Rc<str>,
    injector: Rc<I>,
    inner: Rc<RefCell<Inner>>,
}

impl<I> Clone for ModuleLoader<I> {
    fn clone(&self) -> Self {
        Self {
            src: Rc::clone(&self.src),
            injector: Rc::clone(&self.injector),
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<I: ScriptInjector + 'static> ModuleLoader<I> {
    pub fn new(src: &str, injector: I) -> Self {
        Self {
            src: Rc::from(src),
            injector: Rc::new(injector),
            inner: Rc::new(RefCell::new(Inner {
                state: LoadState::NotStarted,
                waiters: Vec::new(),
                attempts: 0,
            })),
        }
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn state(&self) -> LoadState {
        self.inner.borrow().state
    }

    /// Number of fetches started over the loader's lifetime.
    pub fn attempts(&self) -> u32 {
        self.inner.borrow().attempts
    }

    /// Number of callers currently suspended on an in-flight fetch.
    pub fn pending(&self) -> usize {
        self.inner.borrow().waiters.len()
    }

    /// Resolve once the external module has loaded.
    ///
    /// The state transition (and, for the first caller, the fetch) happens
    /// when `ready` is called, not when the returned future is first polled.
    pub fn ready(&self) -> impl Future<Output = Result<(), LoadError>> + 'static {
        let (tx, rx) = oneshot::channel();
        self.when_ready(Box::new(move |result| {
            // A dropped receiver only means that caller stopped waiting.
            let _ = tx.send(result);
        }));
        async move { rx.await.unwrap_or(Err(LoadError::Abandoned)) }
    }

    /// Run `callback` with the outcome of the current load attempt, starting
    /// one if none is in flight. Runs immediately when already loaded.
    ///
    /// Unlike `ready`, the callback fires whether or not anyone polls.
    pub fn when_ready(&self, callback: Completion) {
        let mut inner = self.inner.borrow_mut();
        let state = inner.state;
        match state {
            LoadState::Loaded => {
                drop(inner);
                tracing::info!(src = %self.src, "module already loaded, nothing to do");
                callback(Ok(()));
            }
            LoadState::Loading => {
                inner.waiters.push(callback);
                tracing::debug!(
                    src = %self.src,
                    waiters = inner.waiters.len(),
                    "module load in flight, waiting"
                );
            }
            LoadState::NotStarted => {
                inner.waiters.push(callback);
                inner.state = LoadState::Loading;
                inner.attempts += 1;
                let attempt = inner.attempts;
                drop(inner);

                tracing::info!(src = %self.src, attempt, "loading module");
                let guard = SettleGuard(Some(self.clone()));
                self.injector
                    .inject(&self.src, Box::new(move |result| guard.fire(result)));
            }
        }
    }

    fn settle(&self, result: Result<(), LoadError>) {
        let waiters = {
            let mut inner = self.inner.borrow_mut();
            if inner.state != LoadState::Loading {
                tracing::warn!(
                    src = %self.src,
                    state = ?inner.state,
                    "ignoring stray load completion"
                );
                return;
            }
            inner.state = match result {
                Ok(()) => LoadState::Loaded,
                Err(_) => LoadState::NotStarted,
            };
            std::mem::take(&mut inner.waiters)
        };

        match &result {
            Ok(()) => tracing::info!(src = %self.src, waiters = waiters.len(), "module loaded"),
            Err(err) => tracing::error!(src = %self.src, waiters = waiters.len(), "{err}"),
        }

        for waiter in waiters {
            waiter(result.clone());
        }
    }
}

/// Settles the in-flight attempt exactly once: with the injector's result when
/// fired, or as `Abandoned` when the completion is dropped unfired.
struct SettleGuard<I: ScriptInjector + 'static>(Option<ModuleLoader<I>>);

impl<I: ScriptInjector + 'static> SettleGuard<I> {
    fn fire(mut self, result: Result<(), LoadError>) {
        if let Some(loader) = self.0.take() {
            loader.settle(result);
        }
    }
}

impl<I: ScriptInjector + 'static> Drop for SettleGuard<I> {
    fn drop(&mut self) {
        if let Some(loader) = self.0.take() {
            loader.settle(Err(LoadError::Abandoned));
        }
    }
}
