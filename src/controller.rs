use crate::config::CameraConfig;
use crate::device::{CaptureEncodingError, DeviceAccessError, VideoDevice};
use crate::feed::{PredictionResult, ResultSink};
use crate::predictor::{AgePredictor, PredictionError};
use bytes::Bytes;
use parking_lot::Mutex as SyncMutex;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::{sync::Mutex, time::timeout};
use tracing::instrument;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera is not active")]
    SessionInactive,
    #[error(transparent)]
    Encoding(#[from] CaptureEncodingError),
    #[error(transparent)]
    Prediction(#[from] PredictionError),
}

/// Outcome of a `capture_and_predict` call. A call made while another
/// capture is being processed is dropped, not queued.
#[derive(Debug)]
pub enum CaptureOutcome {
    Predicted(PredictionResult),
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ProcessingState {
    Idle,
    Processing,
}

/// Resets the processing flag to `Idle` when dropped, so every exit path
/// out of `capture_and_predict` clears it exactly once.
struct ProcessingToken<'a> {
    state: &'a SyncMutex<ProcessingState>,
}

impl Drop for ProcessingToken<'_> {
    fn drop(&mut self) {
        *self.state.lock() = ProcessingState::Idle;
    }
}

/// Owns the camera session and runs the capture, predict, emit pipeline.
pub struct CaptureController<D: VideoDevice, P: AgePredictor> {
    camera_config: CameraConfig,
    predictor: Arc<P>,
    sink: Arc<dyn ResultSink>,
    session: Mutex<Option<D>>,
    processing: SyncMutex<ProcessingState>,
    last_error: SyncMutex<Option<String>>,
    next_seq: AtomicU64,
}

impl<D: VideoDevice, P: AgePredictor> CaptureController<D, P> {
    pub fn new(camera_config: CameraConfig, predictor: Arc<P>, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            camera_config,
            predictor,
            sink,
            session: Mutex::new(None),
            processing: SyncMutex::new(ProcessingState::Idle),
            last_error: SyncMutex::new(None),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Acquires the camera and activates the session; on any failure the
    /// session stays inactive.
    #[instrument(skip(self))]
    pub async fn start_capture(&self) -> Result<(), DeviceAccessError> {
        self.clear_error();

        let mut session = self.session.lock().await;
        if session.is_some() {
            tracing::debug!("Camera session already active");
            return Ok(());
        }

        match timeout(self.camera_config.acquire_timeout(), D::acquire(&self.camera_config)).await
        {
            Ok(Ok(device)) => {
                *session = Some(device);
                tracing::info!("Camera session active");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!("Camera acquisition failed: {:?}", e);
                self.set_error(e.to_string());
                Err(e)
            }
            Err(_) => {
                let e = DeviceAccessError::Timeout(self.camera_config.acquire_timeout_secs);
                tracing::error!("Camera acquisition timed out");
                self.set_error(e.to_string());
                Err(e)
            }
        }
    }

    /// No-op when inactive; does not cancel an in-flight prediction.
    #[instrument(skip(self))]
    pub async fn stop_capture(&self) {
        let mut session = self.session.lock().await;
        if let Some(device) = session.take() {
            device.release().await;
            tracing::info!("Camera session released");
        }
    }

    /// Captures the current frame and submits it for prediction. Exactly one
    /// result reaches the sink on success.
    #[instrument(skip(self))]
    pub async fn capture_and_predict(&self) -> Result<CaptureOutcome, CaptureError> {
        let _token = match self.begin_processing() {
            Some(token) => token,
            None => {
                tracing::debug!("Capture dropped, a prediction is already in flight");
                return Ok(CaptureOutcome::Dropped);
            }
        };
        self.clear_error();

        match self.run_pipeline().await {
            Ok(result) => {
                tracing::info!(
                    id = %result.id,
                    age = result.age,
                    confidence = result.confidence,
                    "Prediction complete"
                );
                self.sink.on_result(result.clone());
                Ok(CaptureOutcome::Predicted(result))
            }
            Err(e) => {
                tracing::error!("Capture failed: {:?}", e);
                self.set_error(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn preview_jpeg(&self) -> Result<Option<Bytes>, CaptureEncodingError> {
        let session = self.session.lock().await;
        match session.as_ref() {
            Some(device) => Ok(Some(device.capture_jpeg().await?)),
            None => Ok(None),
        }
    }

    pub async fn is_active(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub fn is_processing(&self) -> bool {
        *self.processing.lock() == ProcessingState::Processing
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    async fn run_pipeline(&self) -> Result<PredictionResult, CaptureError> {
        // The session lock is held only for the grab, so stop_capture can
        // release the camera while the prediction is still pending.
        let jpeg = {
            let session = self.session.lock().await;
            let device = session.as_ref().ok_or(CaptureError::SessionInactive)?;
            device.capture_jpeg().await?
        };

        let estimate = self.predictor.predict(&jpeg).await?;
        if !(0.0..=1.0).contains(&estimate.confidence) {
            return Err(PredictionError::MalformedResponse(format!(
                "confidence {} out of range",
                estimate.confidence
            ))
            .into());
        }

        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = format!("{timestamp_ms}-{seq}");

        Ok(PredictionResult {
            image_url: format!("/predictions/{id}/image"),
            id,
            age: estimate.age,
            confidence: estimate.confidence,
            timestamp_ms,
            image: jpeg,
        })
    }

    fn begin_processing(&self) -> Option<ProcessingToken<'_>> {
        let mut state = self.processing.lock();
        match *state {
            ProcessingState::Processing => None,
            ProcessingState::Idle => {
                *state = ProcessingState::Processing;
                Some(ProcessingToken {
                    state: &self.processing,
                })
            }
        }
    }

    fn set_error(&self, message: String) {
        *self.last_error.lock() = Some(message);
    }

    fn clear_error(&self) {
        *self.last_error.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::ResultFeed;
    use crate::predictor::AgeEstimate;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{sleep, Duration};

    struct StaticDevice;

    #[async_trait]
    impl VideoDevice for StaticDevice {
        async fn acquire(_config: &CameraConfig) -> Result<Self, DeviceAccessError> {
            Ok(StaticDevice)
        }

        async fn capture_jpeg(&self) -> Result<Bytes, CaptureEncodingError> {
            Ok(Bytes::from_static(b"\xff\xd8frame"))
        }

        async fn release(self) {}
    }

    struct PendingDevice;

    #[async_trait]
    impl VideoDevice for PendingDevice {
        async fn acquire(_config: &CameraConfig) -> Result<Self, DeviceAccessError> {
            std::future::pending().await
        }

        async fn capture_jpeg(&self) -> Result<Bytes, CaptureEncodingError> {
            unreachable!("device never acquires")
        }

        async fn release(self) {}
    }

    struct EmptyFrameDevice;

    #[async_trait]
    impl VideoDevice for EmptyFrameDevice {
        async fn acquire(_config: &CameraConfig) -> Result<Self, DeviceAccessError> {
            Ok(EmptyFrameDevice)
        }

        async fn capture_jpeg(&self) -> Result<Bytes, CaptureEncodingError> {
            Err(CaptureEncodingError::EmptyFrame)
        }

        async fn release(self) {}
    }

    struct DeniedDevice;

    #[async_trait]
    impl VideoDevice for DeniedDevice {
        async fn acquire(_config: &CameraConfig) -> Result<Self, DeviceAccessError> {
            Err(DeviceAccessError::PermissionDenied("device is busy".into()))
        }

        async fn capture_jpeg(&self) -> Result<Bytes, CaptureEncodingError> {
            unreachable!("device never acquires")
        }

        async fn release(self) {}
    }

    struct AbsentDevice;

    #[async_trait]
    impl VideoDevice for AbsentDevice {
        async fn acquire(config: &CameraConfig) -> Result<Self, DeviceAccessError> {
            Err(DeviceAccessError::NoDevice(config.device_index))
        }

        async fn capture_jpeg(&self) -> Result<Bytes, CaptureEncodingError> {
            unreachable!("device never acquires")
        }

        async fn release(self) {}
    }

    struct FixedPredictor {
        estimate: AgeEstimate,
        latency: Duration,
        calls: AtomicUsize,
    }

    impl FixedPredictor {
        fn new(age: u32, confidence: f32, latency: Duration) -> Self {
            Self {
                estimate: AgeEstimate { age, confidence },
                latency,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AgePredictor for FixedPredictor {
        async fn predict(&self, _jpeg: &[u8]) -> Result<AgeEstimate, PredictionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            sleep(self.latency).await;
            Ok(self.estimate)
        }
    }

    struct FailingPredictor;

    #[async_trait]
    impl AgePredictor for FailingPredictor {
        async fn predict(&self, _jpeg: &[u8]) -> Result<AgeEstimate, PredictionError> {
            Err(PredictionError::Rejected("service unavailable".into()))
        }
    }

    fn camera_config() -> CameraConfig {
        CameraConfig {
            device_index: 0,
            width: 640,
            height: 480,
            fps: 30,
            acquire_timeout_secs: 10,
            jpeg_quality: 80,
            stream_fps: 30,
        }
    }

    fn controller<D: VideoDevice, P: AgePredictor>(
        predictor: Arc<P>,
        feed: Arc<ResultFeed>,
    ) -> CaptureController<D, P> {
        CaptureController::new(camera_config(), predictor, feed)
    }

    #[tokio::test(start_paused = true)]
    async fn successful_capture_appends_exactly_one_result() {
        let feed = Arc::new(ResultFeed::new());
        let predictor = Arc::new(FixedPredictor::new(34, 0.91, Duration::from_millis(1500)));
        let controller =
            controller::<StaticDevice, _>(predictor.clone(), feed.clone());

        controller.start_capture().await.unwrap();
        let outcome = controller.capture_and_predict().await.unwrap();

        assert!(matches!(outcome, CaptureOutcome::Predicted(_)));
        assert_eq!(predictor.call_count(), 1);
        assert_eq!(feed.len(), 1);

        let entry = &feed.snapshot()[0];
        assert_eq!(entry.age, 34);
        assert_eq!(entry.confidence, 0.91);
        assert_eq!(entry.image, Bytes::from_static(b"\xff\xd8frame"));
        assert_eq!(entry.image_url, format!("/predictions/{}/image", entry.id));
        assert!(!controller.is_processing());
        assert_eq!(controller.last_error(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn reentrant_capture_is_dropped_not_queued() {
        let feed = Arc::new(ResultFeed::new());
        let predictor = Arc::new(FixedPredictor::new(34, 0.91, Duration::from_millis(1500)));
        let controller =
            controller::<StaticDevice, _>(predictor.clone(), feed.clone());

        controller.start_capture().await.unwrap();
        let (first, second) =
            tokio::join!(controller.capture_and_predict(), controller.capture_and_predict());

        assert!(matches!(first.unwrap(), CaptureOutcome::Predicted(_)));
        assert!(matches!(second.unwrap(), CaptureOutcome::Dropped));
        assert_eq!(predictor.call_count(), 1);
        assert_eq!(feed.len(), 1);
    }

    #[tokio::test]
    async fn failed_prediction_sets_error_and_returns_to_idle() {
        let feed = Arc::new(ResultFeed::new());
        let controller =
            controller::<StaticDevice, _>(Arc::new(FailingPredictor), feed.clone());

        controller.start_capture().await.unwrap();
        let result = controller.capture_and_predict().await;

        assert!(matches!(
            result,
            Err(CaptureError::Prediction(PredictionError::Rejected(_)))
        ));
        assert!(feed.is_empty());
        assert!(!controller.is_processing());
        assert!(controller.last_error().is_some());
    }

    #[tokio::test]
    async fn failed_frame_encode_sets_error_and_returns_to_idle() {
        let feed = Arc::new(ResultFeed::new());
        let predictor = Arc::new(FixedPredictor::new(34, 0.91, Duration::ZERO));
        let controller =
            controller::<EmptyFrameDevice, _>(predictor.clone(), feed.clone());

        controller.start_capture().await.unwrap();
        let result = controller.capture_and_predict().await;

        assert!(matches!(
            result,
            Err(CaptureError::Encoding(CaptureEncodingError::EmptyFrame))
        ));
        assert_eq!(predictor.call_count(), 0);
        assert!(feed.is_empty());
        assert!(!controller.is_processing());
        assert!(controller.last_error().is_some());
    }

    #[tokio::test]
    async fn denied_permission_leaves_session_inactive() {
        let feed = Arc::new(ResultFeed::new());
        let predictor = Arc::new(FixedPredictor::new(34, 0.91, Duration::ZERO));
        let controller = controller::<DeniedDevice, _>(predictor, feed);

        let result = controller.start_capture().await;

        assert!(matches!(result, Err(DeviceAccessError::PermissionDenied(_))));
        assert!(!controller.is_active().await);
        assert!(controller.last_error().is_some());
    }

    #[tokio::test]
    async fn malformed_confidence_is_a_prediction_error() {
        let feed = Arc::new(ResultFeed::new());
        let predictor = Arc::new(FixedPredictor::new(34, 1.5, Duration::ZERO));
        let controller = controller::<StaticDevice, _>(predictor, feed.clone());

        controller.start_capture().await.unwrap();
        let result = controller.capture_and_predict().await;

        assert!(matches!(
            result,
            Err(CaptureError::Prediction(PredictionError::MalformedResponse(_)))
        ));
        assert!(feed.is_empty());
        assert!(!controller.is_processing());
    }

    #[tokio::test]
    async fn capture_without_active_session_is_rejected() {
        let feed = Arc::new(ResultFeed::new());
        let predictor = Arc::new(FixedPredictor::new(34, 0.91, Duration::ZERO));
        let controller = controller::<StaticDevice, _>(predictor.clone(), feed.clone());

        let result = controller.capture_and_predict().await;

        assert!(matches!(result, Err(CaptureError::SessionInactive)));
        assert_eq!(predictor.call_count(), 0);
        assert!(feed.is_empty());
        assert!(!controller.is_processing());
    }

    #[tokio::test]
    async fn stop_releases_device_and_is_idempotent() {
        let feed = Arc::new(ResultFeed::new());
        let predictor = Arc::new(FixedPredictor::new(34, 0.91, Duration::ZERO));
        let controller = controller::<StaticDevice, _>(predictor, feed);

        controller.start_capture().await.unwrap();
        assert!(controller.is_active().await);

        controller.stop_capture().await;
        assert!(!controller.is_active().await);
        assert_eq!(controller.preview_jpeg().await.unwrap(), None);

        // Stopping an inactive session is a no-op.
        controller.stop_capture().await;
        assert!(!controller.is_active().await);
        assert_eq!(controller.last_error(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn acquisition_that_never_resolves_times_out() {
        let feed = Arc::new(ResultFeed::new());
        let predictor = Arc::new(FixedPredictor::new(34, 0.91, Duration::ZERO));
        let controller = controller::<PendingDevice, _>(predictor, feed);

        let result = controller.start_capture().await;

        assert!(matches!(result, Err(DeviceAccessError::Timeout(10))));
        assert!(!controller.is_active().await);
        assert!(controller.last_error().is_some());
    }

    #[tokio::test]
    async fn missing_device_leaves_session_inactive() {
        let feed = Arc::new(ResultFeed::new());
        let predictor = Arc::new(FixedPredictor::new(34, 0.91, Duration::ZERO));
        let controller = controller::<AbsentDevice, _>(predictor, feed);

        let result = controller.start_capture().await;

        assert!(matches!(result, Err(DeviceAccessError::NoDevice(0))));
        assert!(!controller.is_active().await);
        assert!(controller.last_error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_pending_prediction_does_not_cancel_it() {
        let feed = Arc::new(ResultFeed::new());
        let predictor = Arc::new(FixedPredictor::new(34, 0.91, Duration::from_millis(1500)));
        let controller = Arc::new(controller::<StaticDevice, _>(
            predictor.clone(),
            feed.clone(),
        ));

        controller.start_capture().await.unwrap();

        let pending = tokio::spawn({
            let controller = controller.clone();
            async move { controller.capture_and_predict().await }
        });
        // Let the capture grab its frame and reach the prediction await.
        tokio::task::yield_now().await;
        sleep(Duration::from_millis(10)).await;

        controller.stop_capture().await;
        assert!(!controller.is_active().await);

        let outcome = pending.await.unwrap().unwrap();
        assert!(matches!(outcome, CaptureOutcome::Predicted(_)));
        assert_eq!(feed.len(), 1);
    }
}
