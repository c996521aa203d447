use crate::camera::OpenCvCamera;
use crate::config::Config;
use crate::controller::CaptureController;
use crate::feed::ResultFeed;
use crate::prediction::MockAgePredictor;
use crate::server::HttpServer;

use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

/// OpenCV webcam plus the mocked prediction endpoint.
pub type AppController = CaptureController<OpenCvCamera, MockAgePredictor>;

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let feed = Arc::new(ResultFeed::new());
    let predictor = Arc::new(MockAgePredictor::new(&config.prediction));
    let controller: Arc<AppController> = Arc::new(CaptureController::new(
        config.camera.clone(),
        predictor,
        feed.clone(),
    ));

    let server = HttpServer::new(controller.clone(), feed, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    controller.stop_capture().await;
    let _ = server_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
