//! The face feature extraction capability.
//!
//! Handlers only see the [`FaceExtractor`] trait; [`OnnxExtractor`] is the
//! production implementation (SCRFD detection + ArcFace encoding).

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError, ARCFACE_MODEL_VERSION};
use crate::types::DetectedFace;
use image::GrayImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Detects faces in a decoded image and encodes each of them.
///
/// An empty result means no face was found; that is not an error.
pub trait FaceExtractor: Send {
    fn extract(&mut self, image: &GrayImage) -> Result<Vec<DetectedFace>, ExtractError>;

    /// Identifier of the encoding model, stored alongside registered records.
    fn model_version(&self) -> Option<&str> {
        None
    }
}

/// SCRFD + ArcFace extractor backed by ONNX Runtime.
pub struct OnnxExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxExtractor {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, ExtractError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceExtractor for OnnxExtractor {
    fn extract(&mut self, image: &GrayImage) -> Result<Vec<DetectedFace>, ExtractError> {
        let boxes = self.detector.detect(image)?;
        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let embedding = self.recognizer.encode(image, &bbox)?;
            faces.push(DetectedFace { bbox, embedding });
        }
        Ok(faces)
    }

    fn model_version(&self) -> Option<&str> {
        Some(ARCFACE_MODEL_VERSION)
    }
}

/// Default model directory: `$XDG_DATA_HOME/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
        .join("models")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_reports_missing_detector_first() {
        let err = OnnxExtractor::load(Path::new("/nonexistent/models"))
            .err()
            .expect("missing models must fail");
        match err {
            ExtractError::Detector(DetectorError::ModelNotFound(path)) => {
                assert!(path.ends_with(DETECTOR_MODEL_FILE));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_default_model_dir_suffix() {
        assert!(default_model_dir().ends_with("rollcall/models"));
    }
}
