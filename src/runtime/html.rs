//! Host page generation. Produces the HTML document that reserves the
//! drawing surface and boots the shim's wasm package on user action.

use super::helpers::{html_escape, js_string, script_safe_json};
use crate::config::ShimConfig;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOptions {
    pub title: String,
    /// URL of the wasm-bindgen JS glue for this crate.
    pub pkg_url: String,
    pub play_label: String,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            title: "Game".to_string(),
            pkg_url: "/pkg/game_shim.js".to_string(),
            play_label: "Play Now".to_string(),
        }
    }
}

// Inline so any element id works, whether or not it is a valid CSS selector.
const CANVAS_STYLE: &str = "display: block; border: none; position: absolute; top: 0; left: 0;";

/// Full host page for `config`.
pub fn wrap_host_page(config: &ShimConfig, options: &PageOptions) -> Result<String> {
    let title = html_escape(&options.title);
    let canvas_id = html_escape(&config.canvas_id);
    let play_label = html_escape(&options.play_label);
    let config_json = script_safe_json(&config.to_json()?);
    let pkg_url = js_string(&options.pkg_url);

    Ok(format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>
  * {{ margin: 0; padding: 0; box-sizing: border-box; }}
  html, body {{ width: 100%; height: 100%; overflow: hidden; background: #000; }}
  #play {{
    position: fixed;
    top: 50%;
    left: 50%;
    transform: translate(-50%, -50%);
    z-index: 10;
    padding: 14px 36px;
    border: 1px solid #333;
    border-radius: 8px;
    background: #111;
    color: #ddd;
    font: 600 16px/1 system-ui, sans-serif;
    cursor: pointer;
  }}
  #play:hover {{ background: #1a1a1a; color: #fff; }}
  #play[hidden] {{ display: none; }}
</style>
</head>
<body>
<canvas id="{canvas_id}" style="{CANVAS_STYLE}" oncontextmenu="event.preventDefault()"></canvas>
<button id="play" type="button">{play_label}</button>
<script type="module">
import init, {{ GameShim }} from {pkg_url};

const CONFIG = {config_json};
const play = document.getElementById('play');
let shim = null;

await init();

play.addEventListener('click', async () => {{
  play.hidden = true;
  try {{
    if (shim && shim.phase === 'failed') {{
      await shim.retry();
    }} else {{
      shim = new GameShim(CONFIG);
      await shim.mount();
    }}
  }} catch (err) {{
    console.error('[game-shim]', err);
    play.textContent = 'Retry';
    play.hidden = false;
  }}
}});
</script>
</body>
</html>
"##
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_reserves_canvas_and_embeds_config() {
        let html = wrap_host_page(&ShimConfig::default(), &PageOptions::default()).unwrap();
        assert!(html.contains(r#"<canvas id="canvas" style="display: block;"#));
        assert!(html.contains("position: absolute;"));
        assert!(html.contains(r#""moduleSrc":"/game/client.js""#));
        assert!(html.contains("import init, { GameShim } from '/pkg/game_shim.js';"));
        assert!(html.contains(">Play Now</button>"));
        assert!(html.contains("shim.retry()"));
    }

    #[test]
    fn custom_canvas_id_and_title() {
        let config = ShimConfig {
            canvas_id: "stage".to_string(),
            ..ShimConfig::default()
        };
        let options = PageOptions {
            title: "Tanks & <Friends>".to_string(),
            ..PageOptions::default()
        };
        let html = wrap_host_page(&config, &options).unwrap();
        assert!(html.contains(r#"<canvas id="stage""#));
        assert!(!html.contains("#stage"));
        assert!(html.contains("<title>Tanks &amp; &lt;Friends&gt;</title>"));
    }

    #[test]
    fn hostile_module_src_stays_inside_script() {
        let config = ShimConfig {
            module_src: "</script><script>alert(1)</script>".to_string(),
            ..ShimConfig::default()
        };
        let html = wrap_host_page(&config, &PageOptions::default()).unwrap();
        assert_eq!(html.matches("</script>").count(), 1);
    }

    #[test]
    fn selector_unfriendly_ids_keep_full_viewport_styling() {
        for id in ["game.view", "1canvas", "a:b"] {
            let config = ShimConfig {
                canvas_id: id.to_string(),
                ..ShimConfig::default()
            };
            let html = wrap_host_page(&config, &PageOptions::default()).unwrap();
            let tag = format!(r#"<canvas id="{id}" style="{CANVAS_STYLE}""#);
            assert!(html.contains(&tag), "{id}");
        }
    }
}
