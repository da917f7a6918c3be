use image::GrayImage;
use rollcall_core::{DetectedFace, ExtractError, FaceExtractor};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Pending requests before handlers start waiting on the channel.
const ENGINE_QUEUE_DEPTH: usize = 8;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("extractor error: {0}")]
    Extract(#[from] ExtractError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Faces found in one image, plus the model that encoded them.
#[derive(Debug)]
pub struct Extraction {
    pub faces: Vec<DetectedFace>,
    pub model_version: Option<String>,
}

/// Messages sent from HTTP handlers to the engine thread.
struct ExtractRequest {
    image: GrayImage,
    reply: oneshot::Sender<Result<Extraction, EngineError>>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<ExtractRequest>,
}

impl EngineHandle {
    /// Detect and encode every face in `image`. Faces come back in
    /// descending detector confidence.
    pub async fn extract(&self, image: GrayImage) -> Result<Extraction, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ExtractRequest {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread that owns the extractor.
///
/// Inference sessions need `&mut` access, so every request is served in turn
/// by this one thread. The thread exits when the last handle is dropped.
pub fn spawn_engine(mut extractor: Box<dyn FaceExtractor>) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<ExtractRequest>(ENGINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                let (width, height) = req.image.dimensions();
                let started = std::time::Instant::now();
                let result = extractor
                    .extract(&req.image)
                    .map(|faces| Extraction {
                        faces,
                        model_version: extractor.model_version().map(str::to_string),
                    })
                    .map_err(EngineError::from);

                match &result {
                    Ok(extraction) => tracing::debug!(
                        width,
                        height,
                        faces = extraction.faces.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "extraction complete"
                    ),
                    Err(e) => tracing::warn!(width, height, error = %e, "extraction failed"),
                }

                // Caller may have gone away (request cancelled); nothing to do.
                let _ = req.reply.send(result);
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use rollcall_core::{BoundingBox, Embedding};

    /// Reports one face whose encoding is the mean brightness.
    struct MeanBrightness;

    impl FaceExtractor for MeanBrightness {
        fn extract(&mut self, image: &GrayImage) -> Result<Vec<DetectedFace>, ExtractError> {
            let n = (image.width() * image.height()).max(1) as f32;
            let mean = image.pixels().map(|p| p.0[0] as f32).sum::<f32>() / n;
            Ok(vec![DetectedFace {
                bbox: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: image.width() as f32,
                    height: image.height() as f32,
                    confidence: 1.0,
                    landmarks: None,
                },
                embedding: Embedding::new(vec![mean]),
            }])
        }
    }

    #[tokio::test]
    async fn test_extract_round_trips_through_thread() {
        let engine = spawn_engine(Box::new(MeanBrightness)).unwrap();
        let image = GrayImage::from_pixel(4, 4, Luma([200]));
        let extraction = engine.extract(image).await.unwrap();
        assert_eq!(extraction.faces.len(), 1);
        assert_eq!(extraction.faces[0].embedding.values, vec![200.0]);
        assert_eq!(extraction.model_version, None);
    }

    #[tokio::test]
    async fn test_handles_share_one_engine() {
        let engine = spawn_engine(Box::new(MeanBrightness)).unwrap();
        let other = engine.clone();
        let (a, b) = tokio::join!(
            engine.extract(GrayImage::from_pixel(2, 2, Luma([10]))),
            other.extract(GrayImage::from_pixel(2, 2, Luma([20]))),
        );
        assert_eq!(a.unwrap().faces[0].embedding.values, vec![10.0]);
        assert_eq!(b.unwrap().faces[0].embedding.values, vec![20.0]);
    }
}
