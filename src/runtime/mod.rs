//! Generates the HTML page that hosts the shim: a full-viewport canvas, a
//! play toggle that mounts the surface host, and the bootstrap module script.
//!
//! This module is split into:
//! - `html`: the page itself (`wrap_host_page`)
//! - `helpers`: escaping for text embedded in HTML and inline scripts

mod helpers;
mod html;

pub use html::{wrap_host_page, PageOptions};
