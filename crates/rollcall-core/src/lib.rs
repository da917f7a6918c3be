//! rollcall-core — Face encoding and matching for the student registry.
//!
//! Uses SCRFD for face detection and ArcFace for face encoding, both running
//! via ONNX Runtime, and compares encodings by Euclidean distance.

pub mod alignment;
pub mod detector;
pub mod extractor;
pub mod matcher;
pub mod recognizer;
pub mod types;

pub use extractor::{default_model_dir, ExtractError, FaceExtractor, OnnxExtractor};
pub use matcher::{BestMatch, FirstMatch, MatchResult, MatchStrategy, Matcher};
pub use types::{BoundingBox, DetectedFace, Embedding, StudentRecord};
