//! Browser implementations of the host seams over `web-sys`.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, HtmlCanvasElement, HtmlScriptElement, Window};

use crate::error::{LoadError, Result, ShimError};
use crate::geometry::{SurfaceGeometry, Viewport};
use crate::handle::RuntimeHandle;
use crate::host::{HostEnvironment, Surface};
use crate::loader::{Completion, ScriptInjector};

/// Best-effort human-readable text for a thrown JS value.
pub(crate) fn describe(err: &JsValue) -> String {
    if let Some(e) = err.dyn_ref::<js_sys::Error>() {
        return String::from(e.message());
    }
    err.as_string().unwrap_or_else(|| format!("{err:?}"))
}

impl Surface for HtmlCanvasElement {
    fn apply(&self, geometry: &SurfaceGeometry) {
        self.set_width(geometry.backing.width);
        self.set_height(geometry.backing.height);
        let style = self.style();
        for (name, value) in [
            ("width", geometry.display.css_width()),
            ("height", geometry.display.css_height()),
        ] {
            if let Err(err) = style.set_property(name, &value) {
                tracing::warn!(property = name, "failed to set canvas style: {}", describe(&err));
            }
        }
    }
}

/// The page's window and document.
#[derive(Clone)]
pub struct BrowserEnvironment {
    window: Window,
    document: Document,
    handle_global: String,
}

impl BrowserEnvironment {
    /// `handle_global` names the `window` property the runtime handle is
    /// written to (`Module` for Emscripten builds).
    pub fn new(handle_global: &str) -> Result<Self> {
        let window = web_sys::window().ok_or_else(|| ShimError::environment("no global `window`"))?;
        let document = window
            .document()
            .ok_or_else(|| ShimError::environment("window has no document"))?;
        Ok(Self {
            window,
            document,
            handle_global: handle_global.to_string(),
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }
}

/// A registered `resize` listener. Dropping it removes the listener from the
/// window before the closure is released.
pub struct ResizeListener {
    window: Window,
    callback: Closure<dyn FnMut()>,
}

impl Drop for ResizeListener {
    fn drop(&mut self) {
        if let Err(err) = self
            .window
            .remove_event_listener_with_callback("resize", self.callback.as_ref().unchecked_ref())
        {
            tracing::warn!("failed to remove resize listener: {}", describe(&err));
        }
    }
}

impl HostEnvironment for BrowserEnvironment {
    type Surface = HtmlCanvasElement;
    type Subscription = ResizeListener;

    fn find_surface(&self, id: &str) -> Option<HtmlCanvasElement> {
        let element = self.document.get_element_by_id(id)?;
        match element.dyn_into::<HtmlCanvasElement>() {
            Ok(canvas) => Some(canvas),
            Err(_) => {
                tracing::warn!(canvas_id = %id, "element exists but is not a <canvas>");
                None
            }
        }
    }

    fn viewport(&self) -> Viewport {
        let width = self
            .window
            .inner_width()
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        let height = self
            .window
            .inner_height()
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        Viewport::new(width, height, self.window.device_pixel_ratio())
    }

    fn subscribe_resize(&self, handler: Box<dyn FnMut()>) -> Result<ResizeListener> {
        let callback = Closure::wrap(handler);
        self.window
            .add_event_listener_with_callback("resize", callback.as_ref().unchecked_ref())
            .map_err(|err| {
                ShimError::environment(format!("resize listener: {}", describe(&err)))
            })?;
        Ok(ResizeListener {
            window: self.window.clone(),
            callback,
        })
    }

    fn unsubscribe_resize(&self, subscription: ResizeListener) {
        drop(subscription);
    }

    fn defer(&self, task: Box<dyn FnOnce()>) {
        // Shared so the task can still run inline if scheduling fails.
        let slot = Rc::new(RefCell::new(Some(task)));
        let scheduled = Rc::clone(&slot);
        let callback = Closure::once_into_js(move || {
            if let Some(task) = scheduled.borrow_mut().take() {
                task();
            }
        });
        if let Err(err) = self.window.request_animation_frame(callback.unchecked_ref()) {
            tracing::warn!("requestAnimationFrame failed, running inline: {}", describe(&err));
            let task = slot.borrow_mut().take();
            if let Some(task) = task {
                task();
            }
        }
    }

    fn publish_handle(&self, handle: RuntimeHandle<HtmlCanvasElement>) {
        let record = js_sys::Object::new();
        let published = js_sys::Reflect::set(&record, &JsValue::from_str("canvas"), &handle.surface)
            .and_then(|_| {
                js_sys::Reflect::set(&self.window, &JsValue::from_str(&self.handle_global), &record)
            });
        if let Err(err) = published {
            tracing::error!(
                global = %self.handle_global,
                "failed to publish runtime handle: {}",
                describe(&err)
            );
        }
    }
}

/// Loads the external module by appending an async `<script>` to `<body>`.
pub struct DomScriptInjector {
    document: Document,
}

impl DomScriptInjector {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    fn append_script(
        &self,
        src: &str,
        done: &Rc<RefCell<Option<Completion>>>,
    ) -> std::result::Result<(), JsValue> {
        let script: HtmlScriptElement = self.document.create_element("script")?.dyn_into()?;
        script.set_src(src);
        script.set_async(true);

        let on_load = Rc::clone(done);
        script.set_onload(Some(
            Closure::once_into_js(move || settle(&on_load, Ok(()))).unchecked_ref(),
        ));

        let on_error = Rc::clone(done);
        let failed_src = src.to_string();
        script.set_onerror(Some(
            Closure::once_into_js(move || {
                settle(&on_error, Err(LoadError::script(&failed_src, "script failed to load")))
            })
            .unchecked_ref(),
        ));

        let body = self
            .document
            .body()
            .ok_or_else(|| JsValue::from_str("document has no <body>"))?;
        body.append_child(&script)?;
        Ok(())
    }
}

fn settle(slot: &Rc<RefCell<Option<Completion>>>, result: std::result::Result<(), LoadError>) {
    let done = slot.borrow_mut().take();
    if let Some(done) = done {
        done(result);
    }
}

impl ScriptInjector for DomScriptInjector {
    fn inject(&self, src: &str, done: Completion) {
        let slot = Rc::new(RefCell::new(Some(done)));
        if let Err(err) = self.append_script(src, &slot) {
            settle(&slot, Err(LoadError::script(src, describe(&err))));
        }
    }
}
