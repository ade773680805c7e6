//! Shim configuration: where the surface lives, where the external module is
//! fetched from, and under which global name the runtime handle is published.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShimError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ShimConfig {
    /// Id of the reserved `<canvas>` element.
    pub canvas_id: String,
    /// Location of the external module's entry script.
    pub module_src: String,
    /// Global the runtime handle is published under (`window[handleGlobal]`).
    pub handle_global: String,
    /// Apply the first resize on the next display refresh instead of synchronously.
    pub defer_initial_resize: bool,
    /// Maximum diagnostic level (`error`, `warn`, `info`, `debug`, `trace`).
    pub log_level: String,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            canvas_id: "canvas".to_string(),
            module_src: "/game/client.js".to_string(),
            handle_global: "Module".to_string(),
            defer_initial_resize: true,
            log_level: "info".to_string(),
        }
    }
}

impl ShimConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.canvas_id.trim().is_empty() {
            return Err(ShimError::config("canvasId must not be empty"));
        }
        if self.canvas_id.chars().any(char::is_whitespace) {
            return Err(ShimError::config(format!(
                "canvasId `{}` must not contain whitespace",
                self.canvas_id
            )));
        }
        if self.module_src.trim().is_empty() {
            return Err(ShimError::config("moduleSrc must not be empty"));
        }
        if !is_js_identifier(&self.handle_global) {
            return Err(ShimError::config(format!(
                "handleGlobal `{}` is not a valid JavaScript identifier",
                self.handle_global
            )));
        }
        self.max_level()?;
        Ok(())
    }

    /// The configured log level as a `tracing` level.
    pub fn max_level(&self) -> Result<tracing::Level> {
        tracing::Level::from_str(&self.log_level)
            .map_err(|_| ShimError::config(format!("unknown logLevel `{}`", self.log_level)))
    }
}

fn is_js_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
