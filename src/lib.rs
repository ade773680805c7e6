pub mod config;
pub mod error;
pub mod geometry;
pub mod handle;
pub mod headless;
pub mod host;
pub mod loader;
pub mod runtime;
#[cfg(not(target_arch = "wasm32"))]
pub mod server;
#[cfg(feature = "wasm")]
pub mod wasm;

pub use config::ShimConfig;
pub use error::{LoadError, Result, ShimError};
pub use geometry::{BackingSize, DisplaySize, SurfaceGeometry, Viewport};
pub use handle::{HandleSlot, RuntimeHandle};
pub use host::{HostEnvironment, HostOptions, Phase, Surface, SurfaceHost};
pub use loader::{Completion, LoadState, ModuleLoader, ScriptInjector};

/// Build a host and a loader for `env` from one config.
///
/// The loader returned here is private to this pair; pages that mount several
/// hosts should share one loader instead.
pub fn attach<E, I>(env: E, injector: I, config: &ShimConfig) -> (SurfaceHost<E>, ModuleLoader<I>)
where
    E: HostEnvironment,
    I: ScriptInjector + 'static,
{
    (
        SurfaceHost::new(env, HostOptions::from(config)),
        ModuleLoader::new(&config.module_src, injector),
    )
}
