//! The surface host: owns one drawing surface, keeps it sized to the viewport,
//! publishes the runtime handle and attaches the external module.
//!
//! Lifecycle:
//!
//! ```text
//! Unmounted --mount--> Mounting --ready ok--> Active --unmount--> Detached
//!                          |
//!                          +--ready err--> Failed --retry--> Mounting
//! ```
//!
//! `unmount` is accepted from `Mounting`, `Active` and `Failed`. Resize
//! notifications are honoured in those same phases and ignored afterwards.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::channel::oneshot;

use crate::error::{LoadError, Result, ShimError};
use crate::geometry::{SurfaceGeometry, Viewport};
use crate::handle::RuntimeHandle;
use crate::loader::{ModuleLoader, ScriptInjector};

/// A drawing surface the host can size.
pub trait Surface: Clone + 'static {
    /// Set backing resolution and display size.
    fn apply(&self, geometry: &SurfaceGeometry);
}

/// What the host needs from the hosting environment (a browser window, or a
/// headless stand-in).
pub trait HostEnvironment: 'static {
    type Surface: Surface;
    /// Keeps a resize listener registered until handed back to `unsubscribe_resize`.
    type Subscription;

    /// Look up the reserved surface element; `None` if it is not present yet.
    fn find_surface(&self, id: &str) -> Option<Self::Surface>;

    fn viewport(&self) -> Viewport;

    /// Register `handler` to run whenever the viewport size or pixel ratio may
    /// have changed.
    fn subscribe_resize(&self, handler: Box<dyn FnMut()>) -> Result<Self::Subscription>;

    fn unsubscribe_resize(&self, subscription: Self::Subscription);

    /// Run `task` at the next display-refresh opportunity.
    fn defer(&self, task: Box<dyn FnOnce()>);

    /// Make the handle reachable by the external module.
    fn publish_handle(&self, handle: RuntimeHandle<Self::Surface>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unmounted,
    Mounting,
    Active,
    /// The external module failed to load; surface stays sized, `retry` allowed.
    Failed,
    /// Terminal: unmounted after having been mounted.
    Detached,
}

impl Phase {
    /// Phases in which the host owns a live, subscribed surface.
    pub fn is_attached(self) -> bool {
        matches!(self, Phase::Mounting | Phase::Active | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Unmounted => "unmounted",
            Phase::Mounting => "mounting",
            Phase::Active => "active",
            Phase::Failed => "failed",
            Phase::Detached => "detached",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOptions {
    pub canvas_id: String,
    pub defer_initial_resize: bool,
}

impl From<&crate::config::ShimConfig> for HostOptions {
    fn from(config: &crate::config::ShimConfig) -> Self {
        Self {
            canvas_id: config.canvas_id.clone(),
            defer_initial_resize: config.defer_initial_resize,
        }
    }
}

struct HostState<E: HostEnvironment> {
    phase: Phase,
    surface: Option<E::Surface>,
    subscription: Option<E::Subscription>,
    geometry: Option<SurfaceGeometry>,
    resizes: u64,
}

struct Shared<E: HostEnvironment> {
    env: E,
    options: HostOptions,
    state: RefCell<HostState<E>>,
}

/// Owns one drawing surface for one mount cycle.
pub struct SurfaceHost<E: HostEnvironment> {
    shared: Rc<Shared<E>>,
}

impl<E: HostEnvironment> SurfaceHost<E> {
    pub fn new(env: E, options: HostOptions) -> Self {
        Self {
            shared: Rc::new(Shared {
                env,
                options,
                state: RefCell::new(HostState {
                    phase: Phase::Unmounted,
                    surface: None,
                    subscription: None,
                    geometry: None,
                    resizes: 0,
                }),
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        self.shared.state.borrow().phase
    }

    pub fn env(&self) -> &E {
        &self.shared.env
    }

    /// The geometry most recently applied to the surface.
    pub fn geometry(&self) -> Option<SurfaceGeometry> {
        self.shared.state.borrow().geometry
    }

    /// How many times the sizing routine has run against the surface.
    pub fn resize_count(&self) -> u64 {
        self.shared.state.borrow().resizes
    }

    /// Attach the surface and load the external module.
    ///
    /// Sizing, listener registration and handle publication happen when this
    /// is called. The phase moves to `Active` or `Failed` when the load
    /// settles, whether or not the returned future is polled; the future only
    /// reports that outcome. If the surface is missing the loader is never
    /// invoked and nothing is published.
    pub fn mount<I: ScriptInjector + 'static>(
        &self,
        loader: &ModuleLoader<I>,
    ) -> impl Future<Output = Result<()>> + 'static {
        let outcome = self.shared.attach().map(|()| self.shared.await_module(loader));
        settled(outcome)
    }

    /// Make another load attempt after a failed mount.
    pub fn retry<I: ScriptInjector + 'static>(
        &self,
        loader: &ModuleLoader<I>,
    ) -> impl Future<Output = Result<()>> + 'static {
        let outcome = self.shared.reattach().map(|()| self.shared.await_module(loader));
        settled(outcome)
    }

    /// Recompute surface geometry from the current viewport.
    pub fn resize(&self) {
        self.shared.resize();
    }

    /// Detach the resize listener and release the surface.
    ///
    /// An in-flight load is not cancelled; its completion no longer changes
    /// this host.
    pub fn unmount(&self) -> Result<()> {
        self.shared.detach()
    }
}

impl<E: HostEnvironment> Shared<E> {
    fn attach(self: &Rc<Self>) -> Result<()> {
        let phase = self.state.borrow().phase;
        if phase != Phase::Unmounted {
            return Err(ShimError::InvalidTransition {
                phase,
                action: "mount",
            });
        }

        let id = &self.options.canvas_id;
        let Some(surface) = self.env.find_surface(id) else {
            tracing::error!(canvas_id = %id, "surface element not found, mount aborted");
            return Err(ShimError::surface_unavailable(id));
        };

        {
            let mut state = self.state.borrow_mut();
            state.phase = Phase::Mounting;
            state.surface = Some(surface.clone());
        }

        if self.options.defer_initial_resize {
            let host = Rc::downgrade(self);
            self.env.defer(Box::new(move || resize_weak(&host)));
        } else {
            self.resize();
        }

        let host = Rc::downgrade(self);
        let subscribed = self.env.subscribe_resize(Box::new(move || resize_weak(&host)));
        let subscription = match subscribed {
            Ok(subscription) => subscription,
            Err(err) => {
                let mut state = self.state.borrow_mut();
                state.phase = Phase::Unmounted;
                state.surface = None;
                return Err(err);
            }
        };
        self.state.borrow_mut().subscription = Some(subscription);

        self.env.publish_handle(RuntimeHandle::new(surface));
        tracing::debug!(canvas_id = %id, "surface attached, runtime handle published");
        Ok(())
    }

    fn reattach(&self) -> Result<()> {
        let surface = {
            let mut state = self.state.borrow_mut();
            if state.phase != Phase::Failed {
                return Err(ShimError::InvalidTransition {
                    phase: state.phase,
                    action: "retry",
                });
            }
            state.phase = Phase::Mounting;
            state.surface.clone()
        };
        if let Some(surface) = surface {
            self.env.publish_handle(RuntimeHandle::new(surface));
        }
        Ok(())
    }

    /// Ask the loader for the module; the host's phase follows the outcome.
    fn await_module<I: ScriptInjector + 'static>(
        self: &Rc<Self>,
        loader: &ModuleLoader<I>,
    ) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();
        let host = Rc::downgrade(self);
        loader.when_ready(Box::new(move |outcome| {
            let result = match host.upgrade() {
                Some(host) => host.finish(outcome),
                None => outcome.map_err(ShimError::from),
            };
            let _ = tx.send(result);
        }));
        rx
    }

    fn finish(&self, outcome: std::result::Result<(), LoadError>) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let detached = state.phase != Phase::Mounting;
        match outcome {
            Ok(()) => {
                if detached {
                    tracing::debug!(
                        phase = %state.phase,
                        "module ready after host left mounting"
                    );
                } else {
                    state.phase = Phase::Active;
                    tracing::info!(canvas_id = %self.options.canvas_id, "surface host active");
                }
                Ok(())
            }
            Err(err) => {
                if !detached {
                    state.phase = Phase::Failed;
                }
                tracing::error!(canvas_id = %self.options.canvas_id, "mount failed: {err}");
                Err(err.into())
            }
        }
    }

    fn resize(&self) {
        let surface = {
            let state = self.state.borrow();
            if !state.phase.is_attached() {
                tracing::trace!(phase = %state.phase, "resize ignored");
                return;
            }
            match &state.surface {
                Some(surface) => surface.clone(),
                None => return,
            }
        };

        let geometry = SurfaceGeometry::fit(self.env.viewport());
        surface.apply(&geometry);
        tracing::trace!(backing = %geometry.backing, "surface resized");

        let mut state = self.state.borrow_mut();
        state.geometry = Some(geometry);
        state.resizes += 1;
    }

    fn detach(&self) -> Result<()> {
        let subscription = {
            let mut state = self.state.borrow_mut();
            if !state.phase.is_attached() {
                return Err(ShimError::InvalidTransition {
                    phase: state.phase,
                    action: "unmount",
                });
            }
            state.phase = Phase::Detached;
            state.surface = None;
            state.subscription.take()
        };
        if let Some(subscription) = subscription {
            self.env.unsubscribe_resize(subscription);
        }
        tracing::debug!(canvas_id = %self.options.canvas_id, "surface host detached");
        Ok(())
    }
}

impl<E: HostEnvironment> Drop for Shared<E> {
    fn drop(&mut self) {
        if let Some(subscription) = self.state.get_mut().subscription.take() {
            self.env.unsubscribe_resize(subscription);
            tracing::debug!(
                canvas_id = %self.options.canvas_id,
                "surface host dropped while attached"
            );
        }
    }
}

async fn settled(outcome: Result<oneshot::Receiver<Result<()>>>) -> Result<()> {
    outcome?
        .await
        .unwrap_or(Err(ShimError::ModuleLoad(LoadError::Abandoned)))
}

fn resize_weak<E: HostEnvironment>(host: &Weak<Shared<E>>) {
    if let Some(host) = host.upgrade() {
        host.resize();
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;
    use crate::geometry::BackingSize;
    use crate::headless::{HeadlessEnvironment, HeadlessInjector};

    fn options(defer: bool) -> HostOptions {
        HostOptions {
            canvas_id: "canvas".to_string(),
            defer_initial_resize: defer,
        }
    }

    type Fixture = (
        SurfaceHost<HeadlessEnvironment>,
        ModuleLoader<HeadlessInjector>,
        HeadlessInjector,
    );

    fn setup(defer: bool) -> Fixture {
        let env = HeadlessEnvironment::new(Viewport::new(1024.0, 768.0, 2.0));
        env.insert_surface("canvas");
        let injector = HeadlessInjector::new(&env);
        let loader = ModuleLoader::new("/game/client.js", injector.clone());
        (SurfaceHost::new(env, options(defer)), loader, injector)
    }

    #[test]
    fn mount_sizes_subscribes_publishes_then_loads() {
        let (host, loader, injector) = setup(false);
        let mounting = host.mount(&loader);

        assert_eq!(host.phase(), Phase::Mounting);
        let g = host.geometry().expect("sized synchronously");
        assert_eq!(g.backing, BackingSize { width: 2048, height: 1536 });
        assert_eq!(host.env().listener_count(), 1);
        assert!(host.env().handle().is_some());
        assert_eq!(injector.requests().len(), 1);
        assert_eq!(injector.requests()[0].handle_publications, 1);

        injector.complete(Ok(()));
        block_on(mounting).expect("mount should succeed");
        assert_eq!(host.phase(), Phase::Active);
    }

    #[test]
    fn deferred_initial_resize_waits_for_refresh() {
        let (host, loader, injector) = setup(true);
        let mounting = host.mount(&loader);
        assert_eq!(host.geometry(), None);

        assert_eq!(host.env().run_deferred(), 1);
        assert_eq!(
            host.geometry().map(|g| g.backing),
            Some(BackingSize { width: 2048, height: 1536 })
        );

        injector.complete(Ok(()));
        block_on(mounting).unwrap();
    }

    #[test]
    fn missing_surface_aborts_without_loading() {
        let env = HeadlessEnvironment::new(Viewport::new(800.0, 600.0, 1.0));
        let injector = HeadlessInjector::new(&env);
        let loader = ModuleLoader::new("/game/client.js", injector.clone());
        let host = SurfaceHost::new(env, options(false));

        let err = block_on(host.mount(&loader)).unwrap_err();
        assert!(matches!(err, ShimError::SurfaceUnavailable { ref id } if id == "canvas"));
        assert_eq!(host.phase(), Phase::Unmounted);
        assert!(injector.requests().is_empty());
        assert_eq!(loader.attempts(), 0);
        assert!(host.env().handle().is_none());
        assert_eq!(host.env().listener_count(), 0);
    }

    #[test]
    fn resize_while_loading_and_after_active() {
        let (host, loader, injector) = setup(false);
        let mounting = host.mount(&loader);

        host.env().resize_to(Viewport::new(800.0, 600.0, 1.0));
        assert_eq!(host.geometry().unwrap().backing, BackingSize { width: 800, height: 600 });
        assert_eq!(loader.attempts(), 1);

        injector.complete(Ok(()));
        block_on(mounting).unwrap();

        host.env().resize_to(Viewport::new(1280.0, 720.0, 1.0));
        let g = host.geometry().unwrap();
        assert_eq!(g.backing, BackingSize { width: 1280, height: 720 });
        assert_eq!(g.display.css_width(), "1280px");
    }

    #[test]
    fn unmount_detaches_listener() {
        let (host, loader, injector) = setup(false);
        let mounting = host.mount(&loader);
        injector.complete(Ok(()));
        block_on(mounting).unwrap();

        let before = host.resize_count();
        host.unmount().expect("unmount should succeed");
        assert_eq!(host.phase(), Phase::Detached);
        assert_eq!(host.env().listener_count(), 0);

        host.env().resize_to(Viewport::new(300.0, 200.0, 1.0));
        host.resize();
        assert_eq!(host.resize_count(), before);
    }

    #[test]
    fn deferred_resize_after_unmount_is_ignored() {
        let (host, loader, _injector) = setup(true);
        let _mounting = host.mount(&loader);
        host.unmount().unwrap();
        host.env().run_deferred();
        assert_eq!(host.resize_count(), 0);
    }

    #[test]
    fn unmount_during_load_keeps_host_detached() {
        let (host, loader, injector) = setup(false);
        let mounting = host.mount(&loader);
        host.unmount().unwrap();

        injector.complete(Ok(()));
        block_on(mounting).expect("load itself succeeded");
        assert_eq!(host.phase(), Phase::Detached);
        assert_eq!(loader.state(), crate::loader::LoadState::Loaded);
    }

    #[test]
    fn failed_load_then_retry() {
        let (host, loader, injector) = setup(false);
        let mounting = host.mount(&loader);
        injector.fail("404 Not Found");

        let err = block_on(mounting).unwrap_err();
        assert!(err.is_load_failure());
        assert_eq!(host.phase(), Phase::Failed);
        assert_eq!(host.env().listener_count(), 1);

        let retrying = host.retry(&loader);
        assert_eq!(host.phase(), Phase::Mounting);
        assert_eq!(host.env().handle_publications(), 2);
        injector.complete(Ok(()));
        block_on(retrying).unwrap();
        assert_eq!(host.phase(), Phase::Active);
        assert_eq!(injector.requests().len(), 2);
    }

    #[test]
    fn invalid_transitions() {
        let (host, loader, injector) = setup(false);
        assert!(matches!(
            host.unmount(),
            Err(ShimError::InvalidTransition { phase: Phase::Unmounted, action: "unmount" })
        ));
        assert!(block_on(host.retry(&loader)).is_err());

        let mounting = host.mount(&loader);
        let err = block_on(host.mount(&loader)).unwrap_err();
        assert!(matches!(
            err,
            ShimError::InvalidTransition { phase: Phase::Mounting, action: "mount" }
        ));

        injector.complete(Ok(()));
        block_on(mounting).unwrap();
        host.unmount().unwrap();
        assert!(host.unmount().is_err());
        assert_eq!(injector.requests().len(), 1);
    }

    #[test]
    fn phase_follows_load_even_if_mount_future_is_dropped() {
        let (host, loader, injector) = setup(false);
        drop(host.mount(&loader));
        injector.fail("404 Not Found");
        assert_eq!(host.phase(), Phase::Failed);

        drop(host.retry(&loader));
        assert_eq!(host.phase(), Phase::Mounting);
        injector.complete(Ok(()));
        assert_eq!(host.phase(), Phase::Active);
    }

    #[test]
    fn mount_after_load_is_active_immediately() {
        let (host, loader, injector) = setup(false);
        let first = loader.ready();
        injector.complete(Ok(()));
        block_on(first).unwrap();

        let mounting = host.mount(&loader);
        assert_eq!(host.phase(), Phase::Active);
        block_on(mounting).unwrap();
        assert_eq!(injector.requests().len(), 1);
    }

    #[test]
    fn dropping_an_attached_host_releases_its_listener() {
        let (host, loader, injector) = setup(false);
        let env = host.env().clone();
        let mounting = host.mount(&loader);
        assert_eq!(env.listener_count(), 1);

        drop(host);
        assert_eq!(env.listener_count(), 0);

        injector.complete(Ok(()));
        block_on(mounting).expect("the load itself succeeded");
        assert_eq!(env.resize_to(Viewport::new(10.0, 10.0, 1.0)), 0);
    }
}
