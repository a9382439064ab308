//! In-page document, scripts and the typed render command
//!
//! The page side of a capture is driven entirely from here: the canvas
//! document that replaces whatever the browser had loaded, the loader that
//! attaches the visualization bundle, the single "configure and render"
//! command built from a [`GlobeScene`], and the query used to learn when the
//! globe has finished drawing.
//!
//! Every script evaluated in the page returns a JSON *string* so that the
//! automation client hands back a plain value regardless of how it
//! serializes remote objects.

use crate::config::CaptureConfig;
use crate::request::RenderRequest;
use crate::Result;
use serde::{Deserialize, Serialize};

/// DOM id of the canvas the globe is drawn into
pub const CANVAS_ID: &str = "deck-canvas";

pub const VIEW_MIN_ZOOM: f64 = 0.0;
pub const VIEW_MAX_ZOOM: f64 = 20.0;
pub const TILE_MIN_ZOOM: u32 = 0;
pub const TILE_MAX_ZOOM: u32 = 15;
pub const TILE_SIZE: u32 = 256;

/// Full-viewport canvas markup: no margins, no scrollbars, nothing but the
/// canvas in the captured frame.
pub const CANVAS_DOCUMENT: &str = r#"<!DOCTYPE html>
<html>
<head>
<style>
body { margin: 0; width: 100vw; height: 100vh; overflow: hidden; }
canvas { display: block; width: 100%; height: 100%; }
</style>
</head>
<body>
<canvas id="deck-canvas"></canvas>
</body>
</html>"#;

/// Reads the completion state published by [`RENDER_FUNCTION`].
pub const PROGRESS_QUERY: &str = r#"JSON.stringify(window.__globeshot || { phase: 'pending', tilesLoaded: 0, tileErrors: 0, error: null })"#;

// Builds the globe and publishes its progress on `window.__globeshot`:
// loading -> tiles-loaded (viewport tiles fetched) -> idle (next frame drawn).
const RENDER_FUNCTION: &str = r#"function (scene) {
  var state = { phase: 'loading', tilesLoaded: 0, tileErrors: 0, error: null };
  window.__globeshot = state;
  function fail(err) {
    state.phase = 'failed';
    state.error = String((err && err.message) || err);
  }
  try {
    if (typeof deck === 'undefined') {
      throw new Error('visualization library is not loaded (global `deck` missing)');
    }
    var tiles = scene.tileLayer;
    window.__globeshotDeck = new deck.DeckGL({
      canvas: scene.canvasId,
      views: new deck._GlobeView({ resolution: scene.globe.resolution }),
      initialViewState: scene.initialViewState,
      controller: scene.controller,
      onError: fail,
      onAfterRender: function () {
        if (state.phase === 'tiles-loaded') { state.phase = 'idle'; }
      },
      layers: [
        new deck.TileLayer({
          id: 'raster-tiles',
          data: tiles.data,
          minZoom: tiles.minZoom,
          maxZoom: tiles.maxZoom,
          tileSize: tiles.tileSize,
          onTileLoad: function () { state.tilesLoaded += 1; },
          onTileError: function () { state.tileErrors += 1; },
          onViewportLoad: function () {
            if (state.phase === 'loading') { state.phase = 'tiles-loaded'; }
          },
          renderSubLayers: function (props) {
            var bbox = props.tile.bbox;
            return new deck.BitmapLayer(props, {
              data: null,
              image: props.data,
              _imageCoordinateSystem: deck.COORDINATE_SYSTEM.CARTESIAN,
              bounds: [bbox.west, bbox.south, bbox.east, bbox.north]
            });
          }
        })
      ]
    });
    return JSON.stringify({ ok: true, error: null });
  } catch (err) {
    fail(err);
    return JSON.stringify({ ok: false, error: state.error });
  }
}"#;

/// Initial camera of the globe view
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialViewState {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GlobeOptions {
    pub resolution: u32,
}

/// The single raster tile layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileLayerOptions {
    /// URL template with `{z}/{x}/{y}` placeholders
    pub data: String,
    pub min_zoom: u32,
    pub max_zoom: u32,
    pub tile_size: u32,
}

/// The "configure and render" command sent across the automation boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobeScene {
    pub canvas_id: String,
    pub initial_view_state: InitialViewState,
    pub globe: GlobeOptions,
    pub tile_layer: TileLayerOptions,
    pub controller: bool,
}

impl GlobeScene {
    pub fn new(request: &RenderRequest, config: &CaptureConfig) -> Self {
        Self {
            canvas_id: CANVAS_ID.to_string(),
            initial_view_state: InitialViewState {
                latitude: request.latitude,
                longitude: request.longitude,
                zoom: request.zoom,
                min_zoom: VIEW_MIN_ZOOM,
                max_zoom: VIEW_MAX_ZOOM,
            },
            globe: GlobeOptions {
                resolution: config.globe_resolution,
            },
            tile_layer: TileLayerOptions {
                data: config.tile_server_url_template.clone(),
                min_zoom: TILE_MIN_ZOOM,
                max_zoom: TILE_MAX_ZOOM,
                tile_size: TILE_SIZE,
            },
            controller: true,
        }
    }

    /// The viewpoint this scene was built from
    pub fn view(&self) -> RenderRequest {
        RenderRequest {
            latitude: self.initial_view_state.latitude,
            longitude: self.initial_view_state.longitude,
            zoom: self.initial_view_state.zoom,
        }
    }

    /// Expression that builds the scene and evaluates to a [`RenderAck`] JSON string.
    pub fn to_script(&self) -> Result<String> {
        let arg = serde_json::to_string(self)?;
        Ok(format!("({})({})", RENDER_FUNCTION, arg))
    }
}

/// Acknowledgment returned by page-side commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderAck {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl RenderAck {
    pub fn ok() -> Self {
        Self { ok: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { ok: false, error: Some(error.into()) }
    }

    /// Turn a negative acknowledgment into an error built by `wrap`.
    pub fn into_result<F>(self, wrap: F) -> Result<()>
    where
        F: FnOnce(String) -> crate::Error,
    {
        if self.ok {
            Ok(())
        } else {
            Err(wrap(self.error.unwrap_or_else(|| "unknown page error".to_string())))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderPhase {
    /// No render command has run yet
    Pending,
    /// Tiles for the current viewport are still loading
    Loading,
    /// All viewport tiles are in, waiting for the frame that shows them
    TilesLoaded,
    /// A frame containing the loaded tiles has been drawn
    Idle,
    Failed,
}

/// Snapshot of the page-side completion state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderProgress {
    pub phase: RenderPhase,
    #[serde(default)]
    pub tiles_loaded: u32,
    #[serde(default)]
    pub tile_errors: u32,
    #[serde(default)]
    pub error: Option<String>,
}

impl RenderProgress {
    pub fn new(phase: RenderPhase) -> Self {
        Self { phase, tiles_loaded: 0, tile_errors: 0, error: None }
    }
}

/// Expression that attaches `<script src=url>` and resolves to a
/// [`RenderAck`] JSON string once the script has loaded or failed.
pub fn script_loader(url: &str) -> Result<String> {
    let src = serde_json::to_string(url)?;
    Ok(format!(
        r#"new Promise(function (resolve) {{
  var s = document.createElement('script');
  s.src = {src};
  s.onload = function () {{ resolve(JSON.stringify({{ ok: true, error: null }})); }};
  s.onerror = function () {{ resolve(JSON.stringify({{ ok: false, error: 'failed to load ' + s.src }})); }};
  (document.head || document.documentElement).appendChild(s);
}})"#,
        src = src
    ))
}

/// Expression that replaces the current document with `html` and evaluates
/// to a [`RenderAck`] JSON string.
pub fn document_writer(html: &str) -> Result<String> {
    let content = serde_json::to_string(html)?;
    Ok(format!(
        r#"(function () {{
  try {{
    document.open();
    document.write({content});
    document.close();
    return JSON.stringify({{ ok: true, error: null }});
  }} catch (err) {{
    return JSON.stringify({{ ok: false, error: String((err && err.message) || err) }});
  }}
}})()"#,
        content = content
    ))
}
