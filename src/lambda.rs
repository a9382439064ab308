//! AWS Lambda entry point (API Gateway proxy integration).

use globeshot::cdp::CdpLauncher;
use globeshot::logging::{self, LogConfig};
use globeshot::{CaptureConfig, ProxyEvent, ProxyResponse, RenderCaptureHandler};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};

#[tokio::main]
async fn main() -> Result<(), Error> {
    // CloudWatch does not render ANSI colors
    logging::init(LogConfig::from_env().without_ansi());

    let config = CaptureConfig::from_env()?;
    config.validate()?;
    log::info!(
        "Starting with {} output, {}x{} viewport, {}ms render timeout",
        config.image_format,
        config.viewport.width,
        config.viewport.height,
        config.render_timeout_ms
    );

    let handler = RenderCaptureHandler::new(CdpLauncher, config);
    let handler = &handler;

    run(service_fn(move |event: LambdaEvent<ProxyEvent>| async move {
        Ok::<ProxyResponse, Error>(handler.handle(event.payload).await)
    }))
    .await
}
