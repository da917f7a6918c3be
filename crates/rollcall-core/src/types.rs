use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face encoding vector (512-dimensional for ArcFace).
///
/// Serialized as a bare JSON array of floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Build an embedding scaled to unit L2 norm. Zero vectors are kept as-is.
    pub fn normalized(raw: Vec<f32>) -> Self {
        let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            raw.iter().map(|x| x / norm).collect()
        } else {
            raw
        };
        Self { values }
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Embeddings of different length never match: the distance is infinite.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One face found in an image, together with its encoding.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// A registered student and the encodings of every face in their enrollment image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    /// Mirrors the store's mapping key; documents written without it are keyed by the map.
    #[serde(default)]
    pub identity_key: String,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub stored_file: Option<String>,
    pub face_encoding: Vec<Embedding>,
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub registered_at: Option<String>,
}

impl StudentRecord {
    /// Smallest distance between `probe` and any of this record's encodings.
    pub fn distance_to(&self, probe: &Embedding) -> f32 {
        self.face_encoding
            .iter()
            .map(|enc| probe.euclidean_distance(enc))
            .fold(f32::INFINITY, f32::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, encodings: Vec<Vec<f32>>) -> StudentRecord {
        StudentRecord {
            identity_key: key.into(),
            student_name: None,
            student_id: None,
            filename: format!("{key}.jpg"),
            stored_file: None,
            face_encoding: encodings.into_iter().map(Embedding::new).collect(),
            model_version: None,
            registered_at: None,
        }
    }

    #[test]
    fn test_euclidean_identical() {
        let a = Embedding::new(vec![0.3, 0.4, 0.5]);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_euclidean_known_value() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_dimension_mismatch() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!(a.euclidean_distance(&b).is_infinite());
    }

    #[test]
    fn test_normalized_unit_length() {
        let e = Embedding::normalized(vec![3.0, 4.0]);
        assert!((e.values[0] - 0.6).abs() < 1e-6);
        assert!((e.values[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_zero_vector() {
        let e = Embedding::normalized(vec![0.0, 0.0]);
        assert_eq!(e.values, vec![0.0, 0.0]);
    }

    #[test]
    fn test_embedding_serializes_as_array() {
        let e = Embedding::new(vec![1.0, 2.5]);
        assert_eq!(serde_json::to_string(&e).unwrap(), "[1.0,2.5]");
    }

    #[test]
    fn test_record_distance_uses_closest_encoding() {
        let r = record("s1", vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let probe = Embedding::new(vec![0.0, 1.0]);
        assert_eq!(r.distance_to(&probe), 0.0);
    }

    #[test]
    fn test_record_distance_without_encodings() {
        let r = record("s1", vec![]);
        assert!(r.distance_to(&Embedding::new(vec![1.0])).is_infinite());
    }

    #[test]
    fn test_record_deserializes_minimal_document() {
        let json = r#"{"identity_key":"a","filename":"a.jpg","face_encoding":[[0.1,0.2]]}"#;
        let r: StudentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(r.student_name, None);
        assert_eq!(r.face_encoding.len(), 1);
    }
}
