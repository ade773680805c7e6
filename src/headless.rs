//! In-memory host environment and script injector.
//!
//! Stands in for the browser: a settable viewport, named surfaces, resize
//! listeners fired on demand, a queue of deferred tasks drained by
//! `run_deferred` (the "next display refresh"), and fetches that stay pending
//! until `complete` or `fail` is called.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::{LoadError, Result};
use crate::geometry::{BackingSize, SurfaceGeometry, Viewport};
use crate::handle::{HandleSlot, RuntimeHandle};
use crate::host::{HostEnvironment, Surface};
use crate::loader::{Completion, ScriptInjector};

/// A surface that records the geometry applied to it. Clones share it.
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    id: Rc<str>,
    geometry: Rc<Cell<Option<SurfaceGeometry>>>,
}

impl HeadlessSurface {
    fn new(id: &str) -> Self {
        Self {
            id: Rc::from(id),
            geometry: Rc::new(Cell::new(None)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn geometry(&self) -> Option<SurfaceGeometry> {
        self.geometry.get()
    }

    pub fn backing(&self) -> Option<BackingSize> {
        self.geometry.get().map(|g| g.backing)
    }
}

impl PartialEq for HeadlessSurface {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.geometry, &other.geometry)
    }
}

impl Surface for HeadlessSurface {
    fn apply(&self, geometry: &SurfaceGeometry) {
        self.geometry.set(Some(*geometry));
    }
}

type Listener = Rc<RefCell<Box<dyn FnMut()>>>;

/// Returned by `subscribe_resize`; identifies one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

struct EnvState {
    viewport: Viewport,
    surfaces: Vec<HeadlessSurface>,
    listeners: Vec<(u64, Listener)>,
    next_listener: u64,
    deferred: VecDeque<Box<dyn FnOnce()>>,
}

/// Clones share state.
#[derive(Clone)]
pub struct HeadlessEnvironment {
    state: Rc<RefCell<EnvState>>,
    handles: HandleSlot<HeadlessSurface>,
}

impl HeadlessEnvironment {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            state: Rc::new(RefCell::new(EnvState {
                viewport,
                surfaces: Vec::new(),
                listeners: Vec::new(),
                next_listener: 0,
                deferred: VecDeque::new(),
            })),
            handles: HandleSlot::new(),
        }
    }

    /// Create (or return the existing) surface element with this id.
    pub fn insert_surface(&self, id: &str) -> HeadlessSurface {
        let mut state = self.state.borrow_mut();
        if let Some(existing) = state.surfaces.iter().find(|s| s.id() == id) {
            return existing.clone();
        }
        let surface = HeadlessSurface::new(id);
        state.surfaces.push(surface.clone());
        surface
    }

    pub fn remove_surface(&self, id: &str) {
        self.state.borrow_mut().surfaces.retain(|s| s.id() != id);
    }

    /// Change the viewport without notifying listeners.
    pub fn set_viewport(&self, viewport: Viewport) {
        self.state.borrow_mut().viewport = viewport;
    }

    /// Change the viewport and notify every resize listener.
    pub fn resize_to(&self, viewport: Viewport) -> usize {
        self.set_viewport(viewport);
        self.notify_resize()
    }

    /// Fire every registered resize listener, returning how many ran.
    pub fn notify_resize(&self) -> usize {
        let listeners: Vec<Listener> = self
            .state
            .borrow()
            .listeners
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in &listeners {
            let mut handler = listener.borrow_mut();
            (*handler)();
        }
        listeners.len()
    }

    /// Drain the deferred-task queue, including tasks queued while draining.
    pub fn run_deferred(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.state.borrow_mut().deferred.pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    pub fn handle(&self) -> Option<RuntimeHandle<HeadlessSurface>> {
        self.handles.current()
    }

    pub fn handle_publications(&self) -> u32 {
        self.handles.publications()
    }
}

impl HostEnvironment for HeadlessEnvironment {
    type Surface = HeadlessSurface;
    type Subscription = ListenerId;

    fn find_surface(&self, id: &str) -> Option<HeadlessSurface> {
        self.state
            .borrow()
            .surfaces
            .iter()
            .find(|s| s.id() == id)
            .cloned()
    }

    fn viewport(&self) -> Viewport {
        self.state.borrow().viewport
    }

    fn subscribe_resize(&self, handler: Box<dyn FnMut()>) -> Result<ListenerId> {
        let mut state = self.state.borrow_mut();
        let id = state.next_listener;
        state.next_listener += 1;
        state.listeners.push((id, Rc::new(RefCell::new(handler))));
        Ok(ListenerId(id))
    }

    fn unsubscribe_resize(&self, subscription: ListenerId) {
        self.state
            .borrow_mut()
            .listeners
            .retain(|(id, _)| *id != subscription.0);
    }

    fn defer(&self, task: Box<dyn FnOnce()>) {
        self.state.borrow_mut().deferred.push_back(task);
    }

    fn publish_handle(&self, handle: RuntimeHandle<HeadlessSurface>) {
        self.handles.publish(handle);
    }
}

/// One fetch the loader asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectRequest {
    pub src: String,
    /// How many runtime handles had been published when the fetch began.
    pub handle_publications: u32,
}

#[derive(Default)]
struct InjectorState {
    requests: Vec<InjectRequest>,
    pending: Vec<(String, Completion)>,
}

/// Script injector whose fetches settle only when told to. Clones share state.
#[derive(Clone)]
pub struct HeadlessInjector {
    env: HeadlessEnvironment,
    state: Rc<RefCell<InjectorState>>,
}

impl HeadlessInjector {
    /// An injector that observes `env`'s runtime handle at fetch time.
    pub fn new(env: &HeadlessEnvironment) -> Self {
        Self {
            env: env.clone(),
            state: Rc::new(RefCell::new(InjectorState::default())),
        }
    }

    pub fn requests(&self) -> Vec<InjectRequest> {
        self.state.borrow().requests.clone()
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Settle every pending fetch with `result`, returning how many settled.
    pub fn complete(&self, result: std::result::Result<(), LoadError>) -> usize {
        let pending = std::mem::take(&mut self.state.borrow_mut().pending);
        let settled = pending.len();
        for (_, done) in pending {
            done(result.clone());
        }
        settled
    }

    /// Fail every pending fetch as a script error.
    pub fn fail(&self, reason: &str) -> usize {
        let pending = std::mem::take(&mut self.state.borrow_mut().pending);
        let settled = pending.len();
        for (src, done) in pending {
            done(Err(LoadError::script(&src, reason)));
        }
        settled
    }
}

impl ScriptInjector for HeadlessInjector {
    fn inject(&self, src: &str, done: Completion) {
        let handle_publications = self.env.handle_publications();
        let mut state = self.state.borrow_mut();
        state.requests.push(InjectRequest {
            src: src.to_string(),
            handle_publications,
        });
        state.pending.push((src.to_string(), done));
    }
}
