//! WASM bindings for the shim.
//!
//! Exposes `GameShim` (one surface host) and `moduleReady` (the page-wide
//! module loader) to JavaScript via wasm-bindgen.
//! Build with: `wasm-pack build --target web --features wasm`

mod console;
mod dom;

use std::cell::RefCell;
use std::future::Future;

use js_sys::Promise;
use wasm_bindgen::prelude::*;

pub use dom::{BrowserEnvironment, DomScriptInjector, ResizeListener};

use crate::config::ShimConfig;
use crate::host::{HostOptions, SurfaceHost};
use crate::loader::ModuleLoader;

thread_local! {
    // One loader per page: every GameShim shares its LoadState.
    static LOADER: RefCell<Option<ModuleLoader<DomScriptInjector>>> = const { RefCell::new(None) };
}

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
}

fn js_error(err: impl std::fmt::Display) -> JsError {
    JsError::new(&err.to_string())
}

fn parse_config(value: JsValue) -> Result<ShimConfig, JsError> {
    let config = if value.is_undefined() || value.is_null() {
        ShimConfig::default()
    } else {
        serde_wasm_bindgen::from_value(value).map_err(js_error)?
    };
    config.validate().map_err(js_error)?;
    console::init(config.max_level().map_err(js_error)?);
    Ok(config)
}

fn shared_loader(config: &ShimConfig, env: &BrowserEnvironment) -> ModuleLoader<DomScriptInjector> {
    LOADER.with(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(loader) = slot.as_ref() {
            if loader.src() != config.module_src {
                tracing::warn!(
                    loaded = %loader.src(),
                    requested = %config.module_src,
                    "module loader already bound to another script, keeping it"
                );
            }
            return loader.clone();
        }
        let loader = ModuleLoader::new(
            &config.module_src,
            DomScriptInjector::new(env.document().clone()),
        );
        *slot = Some(loader.clone());
        loader
    })
}

fn into_promise(fut: impl Future<Output = crate::Result<()>> + 'static) -> Promise {
    wasm_bindgen_futures::future_to_promise(async move {
        fut.await
            .map(|()| JsValue::UNDEFINED)
            .map_err(|e| js_error(e).into())
    })
}

/// One drawing surface attached to the external module.
///
/// ```js
/// const shim = new GameShim({ canvasId: 'canvas', moduleSrc: '/game/client.js' });
/// await shim.mount();
/// // later
/// shim.unmount();
/// ```
#[wasm_bindgen]
pub struct GameShim {
    host: SurfaceHost<BrowserEnvironment>,
    loader: ModuleLoader<DomScriptInjector>,
}

#[wasm_bindgen]
impl GameShim {
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<GameShim, JsError> {
        let config = parse_config(config)?;
        let env = BrowserEnvironment::new(&config.handle_global).map_err(js_error)?;
        let loader = shared_loader(&config, &env);
        Ok(Self {
            host: SurfaceHost::new(env, HostOptions::from(&config)),
            loader,
        })
    }

    /// Size the canvas, start tracking resizes, publish the runtime handle and
    /// load the module. Rejects if the canvas is missing or the load fails.
    pub fn mount(&self) -> Promise {
        into_promise(self.host.mount(&self.loader))
    }

    /// Try loading the module again after a failed mount.
    pub fn retry(&self) -> Promise {
        into_promise(self.host.retry(&self.loader))
    }

    /// Stop tracking viewport resizes.
    pub fn unmount(&self) -> Result<(), JsError> {
        self.host.unmount().map_err(js_error)
    }

    #[wasm_bindgen(getter)]
    pub fn phase(&self) -> String {
        self.host.phase().to_string()
    }

    /// Recompute canvas size now (e.g. after a layout change the window did
    /// not report).
    pub fn resize(&self) {
        self.host.resize();
    }
}

/// Resolve once the external module is loaded, loading it if nobody has yet.
#[wasm_bindgen(js_name = moduleReady)]
pub fn module_ready(config: JsValue) -> Result<Promise, JsError> {
    let config = parse_config(config)?;
    let env = BrowserEnvironment::new(&config.handle_global).map_err(js_error)?;
    let ready = shared_loader(&config, &env).ready();
    Ok(into_promise(async move { Ok(ready.await?) }))
}
