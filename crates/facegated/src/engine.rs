//! Embedding engine thread.
//!
//! ONNX sessions need exclusive access to run, so a dedicated OS thread
//! owns the [`EmbeddingSource`] and serves requests over a channel.
//! HTTP workers hold a clone-safe [`EngineHandle`] and await replies.

use facegate_core::{Embedding, EmbeddingSource, PipelineError};
use image::DynamicImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("engine thread exited")]
    ChannelClosed,
}

enum EngineRequest {
    DetectAndEmbed {
        image: DynamicImage,
        reply: oneshot::Sender<Result<Vec<Embedding>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Detect faces in the image and return one embedding per face,
    /// in detection order. An image with no faces yields an empty vector.
    pub async fn detect_and_embed(
        &self,
        image: DynamicImage,
    ) -> Result<Vec<Embedding>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::DetectAndEmbed {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The source is constructed by the caller (fail-fast at startup) and
/// moved into the thread; the handle is the only way to reach it.
pub fn spawn_engine(mut source: Box<dyn EmbeddingSource>) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::DetectAndEmbed { image, reply } => {
                        let result = source.detect_and_embed(&image).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}
