use crate::{
    CaptureConfig, Error, GlobeScene, ImageFormat, RenderAck, RenderProgress, RenderSession, Result,
    SessionLauncher,
};
use log::{debug, warn};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

enum Command {
    InjectScript(String, oneshot::Sender<Result<()>>),
    SetContent(String, oneshot::Sender<Result<()>>),
    Render(Box<GlobeScene>, oneshot::Sender<Result<RenderAck>>),
    Progress(oneshot::Sender<Result<RenderProgress>>),
    Capture(ImageFormat, Option<u32>, oneshot::Sender<Result<Vec<u8>>>),
    Close(oneshot::Sender<Result<()>>),
}

/// An async handle to a rendering session owned by a dedicated worker thread.
///
/// The worker thread launches and owns the synchronous [`RenderSession`]
/// and executes commands sent from async tasks, so the session never has to
/// be `Send`. The session is closed exactly once: on [`SessionHandle::close`],
/// or by the worker itself when the handle is dropped without closing.
pub struct SessionHandle {
    cmd_tx: Sender<Command>,
    command_timeout: Duration,
}

impl SessionHandle {
    /// Launch a session on a new worker thread and wait for it to come up.
    pub async fn launch<L: SessionLauncher>(launcher: Arc<L>, config: Arc<CaptureConfig>) -> Result<Self> {
        let command_timeout = config.command_timeout();
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx): (oneshot::Sender<Result<()>>, oneshot::Receiver<Result<()>>) =
            oneshot::channel();

        thread::Builder::new()
            .name("globeshot-session".into())
            .spawn(move || {
                // Launch on the worker thread; the session stays here for its whole life
                let mut session = match launcher.launch(&config) {
                    Ok(s) => s,
                    Err(err) => {
                        let _ = init_tx.send(Err(err));
                        return;
                    }
                };

                if init_tx.send(Ok(())).is_err() {
                    // Nobody is waiting for this session any more
                    if let Err(e) = session.close() {
                        warn!("Failed to close abandoned session: {}", e);
                    }
                    return;
                }

                while let Ok(cmd) = cmd_rx.recv() {
                    match cmd {
                        Command::InjectScript(url, resp) => {
                            let _ = resp.send(session.inject_script(&url));
                        }
                        Command::SetContent(html, resp) => {
                            let _ = resp.send(session.set_content(&html));
                        }
                        Command::Render(scene, resp) => {
                            let _ = resp.send(session.render(&scene));
                        }
                        Command::Progress(resp) => {
                            let _ = resp.send(session.progress());
                        }
                        Command::Capture(format, quality, resp) => {
                            let _ = resp.send(session.capture(format, quality));
                        }
                        Command::Close(resp) => {
                            let _ = resp.send(session.close());
                            return;
                        }
                    }
                }

                // Handle dropped without an explicit close
                debug!("Session handle dropped; closing session");
                if let Err(e) = session.close() {
                    warn!("Failed to close session: {}", e);
                }
            })
            .map_err(|e| Error::SessionLaunch(format!("Failed to spawn session worker: {}", e)))?;

        let init_res = init_rx
            .await
            .map_err(|e| Error::SessionLaunch(format!("Session worker exited during launch: {}", e)))?;
        init_res?;

        Ok(Self { cmd_tx, command_timeout })
    }

    /// Attach the visualization script to the page
    pub async fn inject_script(&self, url: &str) -> Result<()> {
        self.request("InjectScript", |tx| Command::InjectScript(url.to_string(), tx))
            .await
    }

    /// Replace the document content
    pub async fn set_content(&self, html: &str) -> Result<()> {
        self.request("SetContent", |tx| Command::SetContent(html.to_string(), tx))
            .await
    }

    /// Send the typed render command
    pub async fn render(&self, scene: &GlobeScene) -> Result<RenderAck> {
        self.request("Render", |tx| Command::Render(Box::new(scene.clone()), tx))
            .await
    }

    /// Read the page's completion state
    pub async fn progress(&self) -> Result<RenderProgress> {
        self.request("Progress", Command::Progress).await
    }

    /// Screenshot the page
    pub async fn capture(&self, format: ImageFormat, quality: Option<u32>) -> Result<Vec<u8>> {
        self.request("Capture", |tx| Command::Capture(format, quality, tx))
            .await
    }

    /// Close the session and stop the worker.
    ///
    /// Not bounded by the command timeout: `Close` queues behind any command
    /// still running, and this returns only once the session is gone.
    pub async fn close(self) -> Result<()> {
        let rx = self.send("Close", Command::Close)?;
        rx.await
            .map_err(|e| Error::Internal(format!("Close canceled: {}", e)))?
    }

    async fn request<T, F>(&self, name: &str, build: F) -> Result<T>
    where
        F: FnOnce(oneshot::Sender<Result<T>>) -> Command,
    {
        let rx = self.send(name, build)?;
        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(res) => res.map_err(|e| Error::Internal(format!("{} canceled: {}", name, e)))?,
            Err(_) => Err(Error::Timeout(self.command_timeout.as_millis() as u64)),
        }
    }

    fn send<T, F>(&self, name: &str, build: F) -> Result<oneshot::Receiver<Result<T>>>
    where
        F: FnOnce(oneshot::Sender<Result<T>>) -> Command,
    {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .map_err(|_| Error::Internal(format!("{} failed: session worker is gone", name)))?;
        Ok(rx)
    }
}
