//! Chrome DevTools Protocol session implementation

use crate::scene::{self, RenderAck, RenderProgress};
use crate::{CaptureConfig, Error, GlobeScene, ImageFormat, RenderSession, Result, SessionLauncher};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::ffi::OsStr;
use std::sync::Arc;

/// Launches headless Chrome sessions (uses the `headless_chrome` crate)
#[derive(Debug, Clone, Copy, Default)]
pub struct CdpLauncher;

impl SessionLauncher for CdpLauncher {
    type Session = CdpSession;

    fn launch(&self, config: &CaptureConfig) -> Result<CdpSession> {
        CdpSession::launch(config)
    }
}

/// A headless Chrome instance with a single tab sized to the capture viewport.
pub struct CdpSession {
    browser: Browser,
    tab: Arc<Tab>,
}

impl CdpSession {
    pub fn launch(config: &CaptureConfig) -> Result<Self> {
        let args: Vec<&OsStr> = config.browser_args.iter().map(OsStr::new).collect();

        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(config.sandbox)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .path(config.browser_executable_path.clone())
            .args(args)
            .idle_browser_timeout(config.command_timeout().max(config.render_timeout()))
            .build()
            .map_err(|e| Error::SessionLaunch(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::SessionLaunch(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::SessionLaunch(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(config.command_timeout());

        debug!(
            "Launched browser with {}x{} viewport",
            config.viewport.width, config.viewport.height
        );
        Ok(Self { browser, tab })
    }

    /// Evaluate `expression` and decode the JSON string it evaluates to.
    fn eval_json<T, F>(&self, expression: &str, await_promise: bool, wrap: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(String) -> Error,
    {
        let remote = self
            .tab
            .evaluate(expression, await_promise)
            .map_err(|e| wrap(format!("Evaluation failed: {}", e)))?;

        let value = remote
            .value
            .ok_or_else(|| wrap("No value returned from evaluation".into()))?;
        let payload = value
            .as_str()
            .ok_or_else(|| wrap(format!("Expected a JSON string, got {}", value)))?;

        serde_json::from_str(payload).map_err(|e| wrap(format!("Malformed payload '{}': {}", payload, e)))
    }
}

impl RenderSession for CdpSession {
    fn inject_script(&mut self, url: &str) -> Result<()> {
        let loader = scene::script_loader(url)?;
        let ack: RenderAck = self.eval_json(&loader, true, Error::ScriptInjection)?;
        ack.into_result(Error::ScriptInjection)
    }

    fn set_content(&mut self, html: &str) -> Result<()> {
        let writer = scene::document_writer(html)?;
        let ack: RenderAck = self.eval_json(&writer, false, Error::Evaluation)?;
        ack.into_result(|e| Error::Evaluation(format!("Failed to replace document: {}", e)))
    }

    fn render(&mut self, scene: &GlobeScene) -> Result<RenderAck> {
        let script = scene.to_script()?;
        self.eval_json(&script, false, Error::Evaluation)
    }

    fn progress(&mut self) -> Result<RenderProgress> {
        self.eval_json(scene::PROGRESS_QUERY, false, Error::Evaluation)
    }

    fn capture(&mut self, format: ImageFormat, quality: Option<u32>) -> Result<Vec<u8>> {
        let format = match format {
            ImageFormat::Jpeg => Page::CaptureScreenshotFormatOption::Jpeg,
            ImageFormat::Png => Page::CaptureScreenshotFormatOption::Png,
        };

        self.tab
            .capture_screenshot(format, quality, None, true)
            .map_err(|e| Error::Capture(format!("Screenshot failed: {}", e)))
    }

    fn close(self) -> Result<()> {
        if let Err(e) = self.tab.close(true) {
            warn!("Failed to close tab cleanly: {}", e);
        }
        // Dropping the browser terminates the child process
        drop(self.tab);
        drop(self.browser);
        Ok(())
    }
}
