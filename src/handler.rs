//! The render-and-capture request handler
//!
//! One invocation walks a single linear path:
//!
//! ```text
//! Idle -> Launching -> ScriptInjected -> Rendering -> Captured -> Closed
//! ```
//!
//! `Closed` is reachable from every stage. The session is released exactly
//! once whichever stage fails; when the launch itself fails there is nothing
//! to release.

use crate::scene::{self, RenderPhase, RenderProgress};
use crate::{
    CaptureConfig, Error, GlobeScene, ProxyEvent, ProxyResponse, RenderRequest, RenderResult, Result,
    SessionHandle, SessionLauncher,
};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where an invocation currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Idle,
    Launching,
    ScriptInjected,
    Rendering,
    Captured,
    Closed,
}

impl std::fmt::Display for SessionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStage::Idle => "idle",
            SessionStage::Launching => "launching",
            SessionStage::ScriptInjected => "script-injected",
            SessionStage::Rendering => "rendering",
            SessionStage::Captured => "captured",
            SessionStage::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// How the wait for the globe ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum RenderOutcome {
    Complete(RenderProgress),
    TimedOut,
}

/// Renders a globe view per invocation and turns it into a proxy response.
pub struct RenderCaptureHandler<L: SessionLauncher> {
    launcher: Arc<L>,
    config: Arc<CaptureConfig>,
}

impl<L: SessionLauncher> Clone for RenderCaptureHandler<L> {
    fn clone(&self) -> Self {
        Self {
            launcher: self.launcher.clone(),
            config: self.config.clone(),
        }
    }
}

impl<L: SessionLauncher> RenderCaptureHandler<L> {
    pub fn new(launcher: L, config: CaptureConfig) -> Self {
        Self {
            launcher: Arc::new(launcher),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Handle one proxy invocation. Never fails: errors become error responses.
    pub async fn handle(&self, event: ProxyEvent) -> ProxyResponse {
        let request = RenderRequest::from_query(event.query_string_parameters.as_ref(), &self.config.defaults);
        match self.render(request).await {
            Ok(result) => ProxyResponse::image(&result),
            Err(e) => {
                error!("Render failed ({}): {}", e.kind(), e);
                ProxyResponse::error(&e)
            }
        }
    }

    /// Render `request` and capture it, releasing the session on every path.
    pub async fn render(&self, request: RenderRequest) -> Result<RenderResult> {
        let started = Instant::now();
        let mut stage = SessionStage::Idle;
        info!(
            "Rendering globe at lat={} lon={} zoom={}",
            request.latitude, request.longitude, request.zoom
        );

        advance(&mut stage, SessionStage::Launching);
        let session = match SessionHandle::launch(self.launcher.clone(), self.config.clone()).await {
            Ok(s) => s,
            Err(e) => {
                debug!("No session to release after failed launch");
                advance(&mut stage, SessionStage::Closed);
                return Err(e);
            }
        };

        let outcome = self.drive(&session, &request, &mut stage).await;

        if let Err(e) = session.close().await {
            warn!("Failed to release rendering session: {}", e);
        }
        advance(&mut stage, SessionStage::Closed);

        if let Ok(ref result) = outcome {
            info!(
                "Captured {} bytes of {} in {}ms",
                result.image_bytes.len(),
                result.mime_type(),
                started.elapsed().as_millis()
            );
        }
        outcome
    }

    async fn drive(&self, session: &SessionHandle, request: &RenderRequest, stage: &mut SessionStage) -> Result<RenderResult> {
        session.inject_script(&self.config.script_source_url).await?;
        advance(stage, SessionStage::ScriptInjected);

        session.set_content(scene::CANVAS_DOCUMENT).await?;

        let globe = GlobeScene::new(request, &self.config);
        session.render(&globe).await?.into_result(Error::Evaluation)?;
        advance(stage, SessionStage::Rendering);

        match self.await_render_complete(session).await? {
            RenderOutcome::Complete(progress) => debug!(
                "Globe rendered: {} tiles loaded, {} tile errors",
                progress.tiles_loaded, progress.tile_errors
            ),
            RenderOutcome::TimedOut => warn!(
                "Globe did not finish rendering within {}ms; capturing current frame",
                self.config.render_timeout_ms
            ),
        }

        let format = self.config.image_format;
        let image_bytes = session.capture(format, self.config.effective_quality()).await?;
        advance(stage, SessionStage::Captured);

        Ok(RenderResult { image_bytes, format })
    }

    /// Wait for a drawn frame, bounded by the render timeout.
    async fn await_render_complete(&self, session: &SessionHandle) -> Result<RenderOutcome> {
        let poll = poll_until_drawn(session, self.config.poll_interval());
        match tokio::time::timeout(self.config.render_timeout(), poll).await {
            Ok(Ok(progress)) => Ok(RenderOutcome::Complete(progress)),
            Ok(Err(e)) => Err(e),
            Err(_) if self.config.capture_on_timeout => Ok(RenderOutcome::TimedOut),
            Err(_) => Err(Error::Timeout(self.config.render_timeout_ms)),
        }
    }
}

async fn poll_until_drawn(session: &SessionHandle, interval: Duration) -> Result<RenderProgress> {
    loop {
        let progress = session.progress().await?;
        match progress.phase {
            RenderPhase::Idle => return Ok(progress),
            RenderPhase::Failed => {
                return Err(Error::Evaluation(
                    progress.error.unwrap_or_else(|| "render failed".to_string()),
                ))
            }
            RenderPhase::Pending | RenderPhase::Loading | RenderPhase::TilesLoaded => {
                tokio::time::sleep(interval).await
            }
        }
    }
}

fn advance(stage: &mut SessionStage, next: SessionStage) {
    debug!("Session stage: {} -> {}", stage, next);
    *stage = next;
}
