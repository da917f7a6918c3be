use rollcall_core::MatchStrategy;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Euclidean distance between L2-normalized ArcFace encodings
/// (≈ cosine similarity 0.40).
pub const DEFAULT_MATCH_THRESHOLD: f32 = 1.10;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_BODY_LIMIT_MB: usize = 10;
const MAX_BODY_LIMIT_MB: usize = 1024;
const DEFAULT_DATA_DIR: &str = "uploads";
const STORE_FILE_NAME: &str = "registered_data.json";

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address for the HTTP server.
    pub bind_addr: SocketAddr,
    /// Working directory for uploads; created at startup if absent.
    pub data_dir: PathBuf,
    /// Path to the JSON record store.
    pub store_path: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Maximum Euclidean distance for a positive match.
    pub match_threshold: f32,
    pub match_strategy: MatchStrategy,
    /// Registration requires both `name` and `student_id`.
    pub require_student_fields: bool,
    /// Request body and upload size limit, in megabytes.
    pub body_limit_mb: usize,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("ROLLCALL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let store_path = lookup("ROLLCALL_STORE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(STORE_FILE_NAME));

        let bind_addr = parse_or(&lookup, "ROLLCALL_BIND_ADDR", || {
            SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))
        });

        Self {
            bind_addr,
            store_path,
            data_dir,
            model_dir: lookup("ROLLCALL_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(rollcall_core::default_model_dir),
            match_threshold: parse_valid(
                &lookup,
                "ROLLCALL_MATCH_THRESHOLD",
                |t: &f32| t.is_finite() && *t >= 0.0,
                || DEFAULT_MATCH_THRESHOLD,
            ),
            match_strategy: parse_or(&lookup, "ROLLCALL_MATCH_STRATEGY", MatchStrategy::default),
            require_student_fields: lookup("ROLLCALL_REQUIRE_STUDENT_FIELDS")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(false),
            body_limit_mb: parse_valid(
                &lookup,
                "ROLLCALL_BODY_LIMIT_MB",
                |mb: &usize| (1..=MAX_BODY_LIMIT_MB).contains(mb),
                || DEFAULT_BODY_LIMIT_MB,
            ),
        }
    }

    /// Configuration rooted at `data_dir`, with defaults for everything else.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self::from_lookup(|key| match key {
            "ROLLCALL_DATA_DIR" => Some(data_dir.to_string_lossy().into_owned()),
            _ => None,
        })
    }

    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_mb.saturating_mul(1024 * 1024)
    }
}

/// Parse a variable, falling back to the default when unset or malformed.
fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: impl FnOnce() -> T,
) -> T {
    parse_valid(lookup, key, |_| true, default)
}

/// Like [`parse_or`], but values rejected by `valid` also fall back.
fn parse_valid<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    valid: impl Fn(&T) -> bool,
    default: impl FnOnce() -> T,
) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) if valid(&value) => value,
            Ok(_) => {
                tracing::warn!(key, value = %raw, "ignoring out-of-range setting");
                default()
            }
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring malformed setting");
                default()
            }
        },
        None => default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]);
        assert_eq!(c.bind_addr.to_string(), "127.0.0.1:5000");
        assert_eq!(c.data_dir, PathBuf::from("uploads"));
        assert_eq!(c.store_path, PathBuf::from("uploads/registered_data.json"));
        assert_eq!(c.match_threshold, DEFAULT_MATCH_THRESHOLD);
        assert_eq!(c.match_strategy, MatchStrategy::First);
        assert!(!c.require_student_fields);
        assert_eq!(c.body_limit_bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn test_store_follows_data_dir() {
        let c = config(&[("ROLLCALL_DATA_DIR", "/srv/faces")]);
        assert_eq!(c.store_path, PathBuf::from("/srv/faces/registered_data.json"));
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("ROLLCALL_BIND_ADDR", "0.0.0.0:8080"),
            ("ROLLCALL_STORE_FILE", "/tmp/store.json"),
            ("ROLLCALL_MATCH_THRESHOLD", "0.6"),
            ("ROLLCALL_MATCH_STRATEGY", "best"),
            ("ROLLCALL_REQUIRE_STUDENT_FIELDS", "1"),
        ]);
        assert_eq!(c.bind_addr.port(), 8080);
        assert_eq!(c.store_path, PathBuf::from("/tmp/store.json"));
        assert!((c.match_threshold - 0.6).abs() < 1e-6);
        assert_eq!(c.match_strategy, MatchStrategy::Best);
        assert!(c.require_student_fields);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let c = config(&[
            ("ROLLCALL_MATCH_THRESHOLD", "close"),
            ("ROLLCALL_MATCH_STRATEGY", "nearest"),
            ("ROLLCALL_REQUIRE_STUDENT_FIELDS", "false"),
        ]);
        assert_eq!(c.match_threshold, DEFAULT_MATCH_THRESHOLD);
        assert_eq!(c.match_strategy, MatchStrategy::First);
        assert!(!c.require_student_fields);
    }

    #[test]
    fn test_threshold_must_be_finite_and_non_negative() {
        for bad in ["NaN", "inf", "-inf", "-0.5"] {
            let c = config(&[("ROLLCALL_MATCH_THRESHOLD", bad)]);
            assert_eq!(c.match_threshold, DEFAULT_MATCH_THRESHOLD, "accepted {bad}");
        }
        let c = config(&[("ROLLCALL_MATCH_THRESHOLD", "0")]);
        assert_eq!(c.match_threshold, 0.0);
    }

    #[test]
    fn test_body_limit_is_bounded() {
        let huge = usize::MAX.to_string();
        for bad in ["0", "1025", huge.as_str()] {
            let c = config(&[("ROLLCALL_BODY_LIMIT_MB", bad)]);
            assert_eq!(c.body_limit_mb, DEFAULT_BODY_LIMIT_MB, "accepted {bad}");
        }
        let c = config(&[("ROLLCALL_BODY_LIMIT_MB", "1024")]);
        assert_eq!(c.body_limit_bytes(), 1024 * 1024 * 1024);

        let c = Config {
            body_limit_mb: usize::MAX,
            ..config(&[])
        };
        assert_eq!(c.body_limit_bytes(), usize::MAX);
    }
}
