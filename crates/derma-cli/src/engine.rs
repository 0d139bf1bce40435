use derma_core::{AnalysisError, Assessment, Pipeline};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Pending requests allowed per worker before `analyze` waits for room.
const QUEUE_DEPTH_PER_WORKER: usize = 4;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("engine workers exited")]
    ChannelClosed,
    #[error("analysis timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to spawn engine worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent from callers to the worker pool.
struct EngineRequest {
    id: Uuid,
    image: Vec<u8>,
    skin_type: String,
    reply: oneshot::Sender<Result<Assessment, AnalysisError>>,
}

/// Clone-safe handle to the worker pool.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    timeout: Duration,
}

impl EngineHandle {
    /// Run the full pipeline on one photo.
    ///
    /// The deadline bounds how long the caller waits. A worker that is
    /// already busy with the request finishes it and drops the reply.
    pub async fn analyze(&self, id: Uuid, image: Vec<u8>, skin_type: &str) -> Result<Assessment, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = EngineRequest {
            id,
            image,
            skin_type: skin_type.to_string(),
            reply: reply_tx,
        };

        let round_trip = async {
            self.tx
                .send(request)
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            reply_rx.await.map_err(|_| EngineError::ChannelClosed)
        };

        match tokio::time::timeout(self.timeout, round_trip).await {
            Ok(reply) => Ok(reply??),
            Err(_) => {
                tracing::warn!(request_id = %id, timeout = ?self.timeout, "analysis deadline exceeded");
                Err(EngineError::Timeout(self.timeout))
            }
        }
    }
}

/// Spawn `workers` dedicated OS threads sharing one pipeline.
///
/// Analysis is CPU-bound, so it runs off the async runtime; each worker pulls
/// the next request from a shared queue.
pub fn spawn_engine(pipeline: Arc<Pipeline>, workers: usize, timeout: Duration) -> Result<EngineHandle, EngineError> {
    let workers = workers.max(1);
    let (tx, rx) = mpsc::channel::<EngineRequest>(workers * QUEUE_DEPTH_PER_WORKER);
    let rx = Arc::new(Mutex::new(rx));

    for index in 0..workers {
        let rx = Arc::clone(&rx);
        let pipeline = Arc::clone(&pipeline);
        std::thread::Builder::new()
            .name(format!("derma-worker-{index}"))
            .spawn(move || worker_loop(index, &pipeline, &rx))?;
    }

    tracing::info!(workers, timeout = ?timeout, "engine started");
    Ok(EngineHandle { tx, timeout })
}

fn worker_loop(index: usize, pipeline: &Pipeline, rx: &Mutex<mpsc::Receiver<EngineRequest>>) {
    tracing::debug!(worker = index, "engine worker started");
    loop {
        // The lock is held only while waiting, never while analyzing.
        let next = match rx.lock() {
            Ok(mut guard) => guard.blocking_recv(),
            Err(_) => None,
        };
        let Some(req) = next else {
            break;
        };

        let started = std::time::Instant::now();
        let result = pipeline.assess(&req.image, &req.skin_type);
        match &result {
            Ok(assessment) => tracing::info!(
                request_id = %req.id,
                worker = index,
                tag = %assessment.recommendation.tag,
                products = assessment.recommendation.products.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "analysis complete"
            ),
            Err(e) => tracing::info!(
                request_id = %req.id,
                worker = index,
                kind = ?e.kind(),
                error = %e,
                "analysis rejected"
            ),
        }

        if req.reply.send(result).is_err() {
            tracing::debug!(request_id = %req.id, "caller gave up before reply");
        }
    }
    tracing::debug!(worker = index, "engine worker exiting");
}
