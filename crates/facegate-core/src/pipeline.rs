//! Face detection and embedding extraction via ONNX Runtime.
//!
//! Two sessions: an UltraFace-style detector (decoded score/box output
//! tensors, confidence filter + IoU NMS) and a MobileFaceNet-style
//! embedder producing L2-normalized embeddings from 112x112 face crops.

use crate::types::Embedding;
use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const DETECTOR_INPUT_WIDTH: usize = 320;
const DETECTOR_INPUT_HEIGHT: usize = 240;
const DETECTOR_MEAN: f32 = 127.0;
const DETECTOR_STD: f32 = 128.0;
const DETECTOR_CONFIDENCE_THRESHOLD: f32 = 0.7;
const DETECTOR_NMS_THRESHOLD: f32 = 0.3;

const EMBEDDER_INPUT_SIZE: usize = 112;
const EMBEDDER_MEAN: f32 = 127.5;
const EMBEDDER_STD: f32 = 127.5;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("embedder produced {actual} dimensions, expected {expected}")]
    UnexpectedDimension { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// External collaborator that turns a decoded image into face embeddings.
///
/// Returns one embedding per detected face, in detection order; an image
/// with no faces yields an empty vector, never an error.
pub trait EmbeddingSource: Send {
    fn detect_and_embed(&mut self, image: &DynamicImage) -> Result<Vec<Embedding>, PipelineError>;
}

/// Detected face region in original-image pixel coordinates.
#[derive(Debug, Clone)]
pub(crate) struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

/// ONNX-backed detection + embedding pipeline.
///
/// Sessions require `&mut self` to run, so the pipeline is owned by a
/// single engine thread rather than shared across request handlers.
#[derive(Debug)]
pub struct OnnxPipeline {
    detector: Session,
    embedder: Session,
    embedding_dim: usize,
}

impl OnnxPipeline {
    /// Load both ONNX models. Fails fast if either file is missing.
    pub fn load(
        detector_path: &str,
        embedder_path: &str,
        embedding_dim: usize,
    ) -> Result<Self, PipelineError> {
        let detector = load_session(detector_path)?;
        let embedder = load_session(embedder_path)?;
        tracing::info!(
            detector = detector_path,
            embedder = embedder_path,
            embedding_dim,
            "face pipeline loaded"
        );

        Ok(Self {
            detector,
            embedder,
            embedding_dim,
        })
    }

    /// Detect face regions, sorted by descending confidence.
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceBox>, PipelineError> {
        let input = detector_tensor(image);
        let outputs = self
            .detector
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::InferenceFailed(format!("detector scores: {e}")))?;
        let (_, boxes) = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::InferenceFailed(format!("detector boxes: {e}")))?;

        let candidates = decode_detections(
            scores,
            boxes,
            image.width() as f32,
            image.height() as f32,
            DETECTOR_CONFIDENCE_THRESHOLD,
        );
        Ok(non_max_suppression(candidates, DETECTOR_NMS_THRESHOLD))
    }

    /// Extract an L2-normalized embedding from one detected face region.
    fn embed(&mut self, image: &DynamicImage, face: &FaceBox) -> Result<Embedding, PipelineError> {
        let crop = crop_face(image, face);
        let input = embedder_tensor(&crop);
        let outputs = self
            .embedder
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != self.embedding_dim {
            return Err(PipelineError::UnexpectedDimension {
                expected: self.embedding_dim,
                actual: raw.len(),
            });
        }

        Ok(Embedding::new(l2_normalize(raw)))
    }
}

impl EmbeddingSource for OnnxPipeline {
    fn detect_and_embed(&mut self, image: &DynamicImage) -> Result<Vec<Embedding>, PipelineError> {
        let faces = self.detect(image)?;
        tracing::debug!(faces = faces.len(), "detector pass complete");

        let mut embeddings = Vec::with_capacity(faces.len());
        for face in &faces {
            embeddings.push(self.embed(image, face)?);
        }
        Ok(embeddings)
    }
}

fn load_session(model_path: &str) -> Result<Session, PipelineError> {
    if !Path::new(model_path).exists() {
        return Err(PipelineError::ModelNotFound(model_path.to_string()));
    }

    let session = Session::builder()?
        .with_intra_threads(2)?
        .commit_from_file(model_path)?;

    tracing::debug!(
        path = model_path,
        inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
        outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
        "loaded ONNX model"
    );
    Ok(session)
}

/// Resize to the detector input resolution and pack as a normalized
/// NCHW float tensor.
fn detector_tensor(image: &DynamicImage) -> Array4<f32> {
    let resized = image
        .resize_exact(
            DETECTOR_INPUT_WIDTH as u32,
            DETECTOR_INPUT_HEIGHT as u32,
            image::imageops::FilterType::Triangle,
        )
        .to_rgb8();

    let mut tensor = Array4::<f32>::zeros((1, 3, DETECTOR_INPUT_HEIGHT, DETECTOR_INPUT_WIDTH));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel[c] as f32 - DETECTOR_MEAN) / DETECTOR_STD;
        }
    }
    tensor
}

/// Decode detector outputs into pixel-space face boxes.
///
/// `scores` is `[1, N, 2]` (background, face) and `boxes` is `[1, N, 4]`
/// with corner coordinates normalized to [0, 1]. Results are sorted by
/// descending confidence, which fixes the per-face detection order.
pub(crate) fn decode_detections(
    scores: &[f32],
    boxes: &[f32],
    image_width: f32,
    image_height: f32,
    confidence_threshold: f32,
) -> Vec<FaceBox> {
    let count = scores.len() / 2;
    let mut detections = Vec::new();

    for i in 0..count.min(boxes.len() / 4) {
        let confidence = scores[i * 2 + 1];
        if confidence < confidence_threshold {
            continue;
        }

        let x1 = (boxes[i * 4] * image_width).clamp(0.0, image_width);
        let y1 = (boxes[i * 4 + 1] * image_height).clamp(0.0, image_height);
        let x2 = (boxes[i * 4 + 2] * image_width).clamp(0.0, image_width);
        let y2 = (boxes[i * 4 + 3] * image_height).clamp(0.0, image_height);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        detections.push(FaceBox {
            x1,
            y1,
            x2,
            y2,
            confidence,
        });
    }

    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    detections
}

fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let intersection = ix * iy;
    let union = (a.x2 - a.x1) * (a.y2 - a.y1) + (b.x2 - b.x1) * (b.y2 - b.y1) - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Greedy IoU suppression over confidence-sorted detections.
pub(crate) fn non_max_suppression(candidates: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    let mut kept: Vec<FaceBox> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| iou(k, &candidate) < iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// Crop the face region and resize to the embedder input size.
fn crop_face(image: &DynamicImage, face: &FaceBox) -> image::RgbImage {
    let x = face.x1.floor().max(0.0) as u32;
    let y = face.y1.floor().max(0.0) as u32;
    let w = ((face.x2 - face.x1).ceil() as u32).clamp(1, image.width().saturating_sub(x).max(1));
    let h = ((face.y2 - face.y1).ceil() as u32).clamp(1, image.height().saturating_sub(y).max(1));

    image
        .crop_imm(x, y, w, h)
        .resize_exact(
            EMBEDDER_INPUT_SIZE as u32,
            EMBEDDER_INPUT_SIZE as u32,
            image::imageops::FilterType::Triangle,
        )
        .to_rgb8()
}

/// Pack a 112x112 RGB crop as a symmetric-normalized NCHW float tensor.
fn embedder_tensor(crop: &image::RgbImage) -> Array4<f32> {
    let size = EMBEDDER_INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel[c] as f32 - EMBEDDER_MEAN) / EMBEDDER_STD;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
