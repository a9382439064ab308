//! Globeshot render-and-capture handler
//!
//! Renders a deck.gl globe centered on a requested coordinate inside a
//! headless browser and returns a screenshot of it as an API Gateway proxy
//! response.
//!
//! # Features
//!
//! - **CDP Backend** (`cdp`, default): drives headless Chrome through the
//!   Chrome DevTools Protocol
//! - **Lambda entry point** (`lambda`, default): the `bootstrap` binary for
//!   the AWS Lambda runtime
//! - **Swappable sessions**: the browser sits behind [`RenderSession`] and
//!   [`SessionLauncher`], so the handler can be exercised with stubs
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "cdp")]
//! # async fn run() -> globeshot::Result<()> {
//! use globeshot::{CaptureConfig, RenderCaptureHandler, RenderRequest};
//!
//! let handler = RenderCaptureHandler::new(globeshot::cdp::CdpLauncher, CaptureConfig::png());
//! let result = handler
//!     .render(RenderRequest { latitude: 48.8566, longitude: 2.3522, zoom: 8.0 })
//!     .await?;
//! std::fs::write("paris.png", &result.image_bytes).ok();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, ErrorKind, Result};

pub mod config;
pub use config::{CaptureConfig, ImageFormat, Viewport};

pub mod request;
pub use request::RenderRequest;

pub mod scene;
pub use scene::{GlobeScene, RenderAck, RenderPhase, RenderProgress};

pub mod response;
pub use response::{ProxyEvent, ProxyResponse};

// Worker-thread facade that lets async code drive a synchronous session
pub mod async_api;
pub use async_api::SessionHandle;

pub mod handler;
pub use handler::{RenderCaptureHandler, SessionStage};

pub mod logging;

#[cfg(feature = "cdp")]
pub mod cdp;

use base64::Engine as Base64Engine;

/// A captured image, produced once per invocation
#[derive(Debug, Clone, PartialEq)]
pub struct RenderResult {
    /// Encoded image bytes
    pub image_bytes: Vec<u8>,
    /// Encoding of `image_bytes`
    pub format: ImageFormat,
}

impl RenderResult {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// Base64 (standard alphabet, padded) body for transport
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.image_bytes)
    }
}

/// One browser-automation session: a single page with a fixed viewport.
///
/// Implementations are synchronous and do not need to be `Send`; they are
/// created and used on the worker thread owned by [`SessionHandle`].
pub trait RenderSession {
    /// Attach `<script src=url>` to the current document and wait for it to load
    fn inject_script(&mut self, url: &str) -> Result<()>;

    /// Replace the document content with `html`
    fn set_content(&mut self, html: &str) -> Result<()>;

    /// Run the "configure and render" command in the page
    fn render(&mut self, scene: &GlobeScene) -> Result<RenderAck>;

    /// Read the page's current completion state
    fn progress(&mut self) -> Result<RenderProgress>;

    /// Screenshot the rendering surface
    fn capture(&mut self, format: ImageFormat, quality: Option<u32>) -> Result<Vec<u8>>;

    /// Terminate the session and release the browser
    fn close(self) -> Result<()>;
}

/// Starts [`RenderSession`]s. Shared across invocations, so it must be
/// thread-safe; the sessions it creates are not.
pub trait SessionLauncher: Send + Sync + 'static {
    type Session: RenderSession;

    fn launch(&self, config: &CaptureConfig) -> Result<Self::Session>;
}
