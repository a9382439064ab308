//! Handler tests against a scripted in-memory session

use base64::Engine as _;
use globeshot::{
    CaptureConfig, Error, GlobeScene, ImageFormat, ProxyEvent, RenderAck, RenderCaptureHandler, RenderPhase,
    RenderProgress, RenderRequest, RenderSession, Result, SessionLauncher,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const FAKE_JPEG: &[u8] = b"\xff\xd8\xff\xe0fake-jpeg";

#[derive(Debug, Clone, Copy, PartialEq)]
enum FailAt {
    Launch,
    Inject,
    RenderThrows,
    RenderStalls,
    RenderNack,
    Capture,
}

/// Shared record of everything the stub session saw
#[derive(Default)]
struct Recorder {
    launches: AtomicUsize,
    closes: AtomicUsize,
    progress_calls: AtomicUsize,
    scripts: Mutex<Vec<String>>,
    contents: Mutex<Vec<String>>,
    scenes: Mutex<Vec<GlobeScene>>,
    captures: Mutex<Vec<(ImageFormat, Option<u32>)>>,
}

struct StubLauncher {
    seen: Arc<Recorder>,
    fail_at: Option<FailAt>,
    phases: Vec<RenderPhase>,
}

impl StubLauncher {
    fn healthy(seen: Arc<Recorder>) -> Self {
        Self { seen, fail_at: None, phases: vec![RenderPhase::Idle] }
    }

    fn failing(seen: Arc<Recorder>, at: FailAt) -> Self {
        Self { fail_at: Some(at), ..Self::healthy(seen) }
    }

    fn with_phases(seen: Arc<Recorder>, phases: &[RenderPhase]) -> Self {
        Self { phases: phases.to_vec(), ..Self::healthy(seen) }
    }
}

struct StubSession {
    seen: Arc<Recorder>,
    fail_at: Option<FailAt>,
    phases: VecDeque<RenderPhase>,
}

impl SessionLauncher for StubLauncher {
    type Session = StubSession;

    fn launch(&self, _config: &CaptureConfig) -> Result<StubSession> {
        self.seen.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(FailAt::Launch) {
            return Err(Error::SessionLaunch("chrome binary not found".into()));
        }
        Ok(StubSession {
            seen: self.seen.clone(),
            fail_at: self.fail_at,
            phases: self.phases.iter().copied().collect(),
        })
    }
}

impl RenderSession for StubSession {
    fn inject_script(&mut self, url: &str) -> Result<()> {
        if self.fail_at == Some(FailAt::Inject) {
            return Err(Error::ScriptInjection(format!("failed to load {}", url)));
        }
        self.seen.scripts.lock().unwrap().push(url.to_string());
        Ok(())
    }

    fn set_content(&mut self, html: &str) -> Result<()> {
        self.seen.contents.lock().unwrap().push(html.to_string());
        Ok(())
    }

    fn render(&mut self, scene: &GlobeScene) -> Result<RenderAck> {
        self.seen.scenes.lock().unwrap().push(scene.clone());
        if self.fail_at == Some(FailAt::RenderStalls) {
            std::thread::sleep(std::time::Duration::from_millis(300));
        }
        match self.fail_at {
            Some(FailAt::RenderThrows) => Err(Error::Evaluation("ReferenceError: deck is not defined".into())),
            Some(FailAt::RenderNack) => Ok(RenderAck::failed("_GlobeView is not a constructor")),
            _ => Ok(RenderAck::ok()),
        }
    }

    fn progress(&mut self) -> Result<RenderProgress> {
        self.seen.progress_calls.fetch_add(1, Ordering::SeqCst);
        // The last phase repeats forever
        let phase = if self.phases.len() > 1 {
            self.phases.pop_front().unwrap()
        } else {
            self.phases.front().copied().unwrap_or(RenderPhase::Loading)
        };
        let mut progress = RenderProgress::new(phase);
        if phase == RenderPhase::Failed {
            progress.error = Some("WebGL context lost".into());
        }
        Ok(progress)
    }

    fn capture(&mut self, format: ImageFormat, quality: Option<u32>) -> Result<Vec<u8>> {
        self.seen.captures.lock().unwrap().push((format, quality));
        if self.fail_at == Some(FailAt::Capture) {
            return Err(Error::Capture("Screenshot failed: target closed".into()));
        }
        Ok(FAKE_JPEG.to_vec())
    }

    fn close(self) -> Result<()> {
        self.seen.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn fast_config() -> CaptureConfig {
    CaptureConfig {
        poll_interval_ms: 5,
        render_timeout_ms: 2000,
        ..CaptureConfig::default()
    }
}

fn error_kind(body: &str) -> String {
    let v: serde_json::Value = serde_json::from_str(body).unwrap();
    v["error"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn paris_request_reaches_render_command_unmodified() {
    let seen = Arc::new(Recorder::default());
    let handler = RenderCaptureHandler::new(StubLauncher::healthy(seen.clone()), fast_config());

    let event = ProxyEvent::with_query([("latitude", "48.8566"), ("longitude", "2.3522"), ("zoom", "8")]);
    let response = handler.handle(event).await;

    assert_eq!(response.status_code, 200);
    let scenes = seen.scenes.lock().unwrap();
    assert_eq!(scenes.len(), 1);
    assert_eq!(scenes[0].view(), RenderRequest { latitude: 48.8566, longitude: 2.3522, zoom: 8.0 });
    assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_query_uses_defaults_and_returns_image() {
    let seen = Arc::new(Recorder::default());
    let handler = RenderCaptureHandler::new(StubLauncher::healthy(seen.clone()), fast_config());

    let response = handler.handle(ProxyEvent::default()).await;

    assert_eq!(response.status_code, 200);
    assert_eq!(response.content_type(), Some("image/jpeg"));
    assert!(response.is_base64_encoded);
    let decoded = base64::engine::general_purpose::STANDARD.decode(&response.body).unwrap();
    assert_eq!(decoded, FAKE_JPEG);

    let scenes = seen.scenes.lock().unwrap();
    assert_eq!(scenes[0].view(), RenderRequest { latitude: 51.12, longitude: 0.13, zoom: 5.0 });
    assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_numeric_parameters_fall_back_to_defaults() {
    let seen = Arc::new(Recorder::default());
    let handler = RenderCaptureHandler::new(StubLauncher::healthy(seen.clone()), fast_config());

    let event = ProxyEvent::with_query([("latitude", "abc"), ("longitude", ""), ("zoom", "12")]);
    let response = handler.handle(event).await;

    assert_eq!(response.status_code, 200);
    let scenes = seen.scenes.lock().unwrap();
    assert_eq!(scenes[0].view(), RenderRequest { latitude: 51.12, longitude: 0.13, zoom: 12.0 });
}

#[tokio::test]
async fn session_follows_inject_then_content_then_render() {
    let seen = Arc::new(Recorder::default());
    let config = fast_config();
    let script_url = config.script_source_url.clone();
    let handler = RenderCaptureHandler::new(StubLauncher::healthy(seen.clone()), config);

    handler.handle(ProxyEvent::default()).await;

    assert_eq!(*seen.scripts.lock().unwrap(), vec![script_url]);
    let contents = seen.contents.lock().unwrap();
    assert_eq!(contents.len(), 1);
    assert!(contents[0].contains("<canvas id=\"deck-canvas\">"));
    assert!(contents[0].contains("overflow: hidden"));
    assert_eq!(*seen.captures.lock().unwrap(), vec![(ImageFormat::Jpeg, Some(70))]);
}

#[tokio::test]
async fn png_variant_declares_png() {
    let seen = Arc::new(Recorder::default());
    let config = CaptureConfig { poll_interval_ms: 5, ..CaptureConfig::png() };
    let handler = RenderCaptureHandler::new(StubLauncher::healthy(seen.clone()), config);

    let response = handler.handle(ProxyEvent::default()).await;

    assert_eq!(response.content_type(), Some("image/png"));
    assert_eq!(*seen.captures.lock().unwrap(), vec![(ImageFormat::Png, None)]);
    assert_eq!(seen.scenes.lock().unwrap()[0].globe.resolution, 7);
}

#[tokio::test]
async fn waits_for_idle_before_capturing() {
    let seen = Arc::new(Recorder::default());
    let launcher = StubLauncher::with_phases(
        seen.clone(),
        &[RenderPhase::Pending, RenderPhase::Loading, RenderPhase::TilesLoaded, RenderPhase::Idle],
    );
    let handler = RenderCaptureHandler::new(launcher, fast_config());

    let response = handler.handle(ProxyEvent::default()).await;

    assert_eq!(response.status_code, 200);
    assert_eq!(seen.progress_calls.load(Ordering::SeqCst), 4);
    assert_eq!(seen.captures.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn evaluation_failure_still_closes_session_once() {
    let seen = Arc::new(Recorder::default());
    let handler = RenderCaptureHandler::new(StubLauncher::failing(seen.clone(), FailAt::RenderThrows), fast_config());

    let response = handler.handle(ProxyEvent::default()).await;

    assert_eq!(response.status_code, 500);
    assert_eq!(error_kind(&response.body), "evaluation");
    assert!(seen.captures.lock().unwrap().is_empty());
    assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn negative_render_ack_is_an_evaluation_error() {
    let seen = Arc::new(Recorder::default());
    let handler = RenderCaptureHandler::new(StubLauncher::failing(seen.clone(), FailAt::RenderNack), fast_config());

    let err = handler.render(RenderRequest::default()).await.unwrap_err();

    assert!(matches!(err, Error::Evaluation(ref m) if m.contains("_GlobeView")));
    assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn launch_failure_returns_error_without_release() {
    let seen = Arc::new(Recorder::default());
    let handler = RenderCaptureHandler::new(StubLauncher::failing(seen.clone(), FailAt::Launch), fast_config());

    let response = handler.handle(ProxyEvent::default()).await;

    assert_eq!(response.status_code, 503);
    assert_eq!(error_kind(&response.body), "session_launch");
    assert_eq!(seen.launches.load(Ordering::SeqCst), 1);
    assert_eq!(seen.closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn script_injection_failure_maps_to_bad_gateway() {
    let seen = Arc::new(Recorder::default());
    let handler = RenderCaptureHandler::new(StubLauncher::failing(seen.clone(), FailAt::Inject), fast_config());

    let response = handler.handle(ProxyEvent::default()).await;

    assert_eq!(response.status_code, 502);
    assert!(seen.scenes.lock().unwrap().is_empty());
    assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn capture_failure_still_closes_session_once() {
    let seen = Arc::new(Recorder::default());
    let handler = RenderCaptureHandler::new(StubLauncher::failing(seen.clone(), FailAt::Capture), fast_config());

    let response = handler.handle(ProxyEvent::default()).await;

    assert_eq!(response.status_code, 500);
    assert_eq!(error_kind(&response.body), "capture");
    assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn page_reported_failure_aborts_wait() {
    let seen = Arc::new(Recorder::default());
    let launcher = StubLauncher::with_phases(seen.clone(), &[RenderPhase::Loading, RenderPhase::Failed]);
    let handler = RenderCaptureHandler::new(launcher, fast_config());

    let err = handler.render(RenderRequest::default()).await.unwrap_err();

    assert!(matches!(err, Error::Evaluation(ref m) if m == "WebGL context lost"));
    assert!(seen.captures.lock().unwrap().is_empty());
    assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn render_timeout_captures_current_frame_by_default() {
    let seen = Arc::new(Recorder::default());
    let launcher = StubLauncher::with_phases(seen.clone(), &[RenderPhase::Loading]);
    let config = CaptureConfig { render_timeout_ms: 50, ..fast_config() };
    let handler = RenderCaptureHandler::new(launcher, config);

    let response = handler.handle(ProxyEvent::default()).await;

    assert_eq!(response.status_code, 200);
    assert_eq!(seen.captures.lock().unwrap().len(), 1);
    assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn render_timeout_fails_when_partial_capture_disabled() {
    let seen = Arc::new(Recorder::default());
    let launcher = StubLauncher::with_phases(seen.clone(), &[RenderPhase::TilesLoaded]);
    let config = CaptureConfig {
        render_timeout_ms: 50,
        capture_on_timeout: false,
        ..fast_config()
    };
    let handler = RenderCaptureHandler::new(launcher, config);

    let response = handler.handle(ProxyEvent::default()).await;

    assert_eq!(response.status_code, 504);
    assert_eq!(error_kind(&response.body), "timeout");
    assert!(seen.captures.lock().unwrap().is_empty());
    assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn each_invocation_gets_its_own_session() {
    let seen = Arc::new(Recorder::default());
    let handler = RenderCaptureHandler::new(StubLauncher::healthy(seen.clone()), fast_config());

    let (a, b) = tokio::join!(
        handler.handle(ProxyEvent::default()),
        handler.handle(ProxyEvent::with_query([("zoom", "3")]))
    );

    assert_eq!(a.status_code, 200);
    assert_eq!(b.status_code, 200);
    assert_eq!(seen.launches.load(Ordering::SeqCst), 2);
    assert_eq!(seen.closes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn command_timeout_releases_session_before_responding() {
    let seen = Arc::new(Recorder::default());
    let config = CaptureConfig { command_timeout_ms: 50, ..fast_config() };
    let handler = RenderCaptureHandler::new(StubLauncher::failing(seen.clone(), FailAt::RenderStalls), config);

    let response = handler.handle(ProxyEvent::default()).await;

    assert_eq!(response.status_code, 504);
    assert_eq!(error_kind(&response.body), "timeout");
    assert!(seen.captures.lock().unwrap().is_empty());
    assert_eq!(seen.closes.load(Ordering::SeqCst), 1);
}
