//! Image ingestion: multipart parsing, upload validation, persistence, decode.

use axum::body::Bytes;
use axum::extract::Multipart;
use image::GrayImage;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";
pub const NAME_FIELD: &str = "name";
pub const STUDENT_ID_FIELD: &str = "student_id";

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg"];
const MAX_STUDENT_ID_LEN: usize = 64;
const MAX_FILENAME_LEN: usize = 255;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No image uploaded")]
    MissingImage,
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("Failed to parse multipart form: {0}")]
    Multipart(String),
    #[error("Invalid image format '{0}' (only jpeg/jpg supported)")]
    InvalidExtension(String),
    #[error("Invalid filename '{0}'")]
    InvalidFilename(String),
    #[error(
        "Filename '{0}' cannot be used as a key (use letters, digits, '.', '_' or '-', or supply student_id)"
    )]
    InvalidFilenameKey(String),
    #[error("Invalid student_id '{0}' (use letters, digits, '.', '_' or '-', at most 64 characters)")]
    InvalidStudentId(String),
    #[error("File too large: {size} bytes exceeds maximum of {max} bytes")]
    TooLarge { size: usize, max: usize },
    #[error("upload I/O: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Decode(#[from] image::ImageError),
    #[error("decode task failed: {0}")]
    DecodeTaskFailed(#[from] tokio::task::JoinError),
}

/// The uploaded image as received.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied filename, unsanitized.
    pub file_name: Option<String>,
    pub data: Bytes,
}

/// Parsed `/register` or `/match` form.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub image: Option<UploadedFile>,
    pub name: Option<String>,
    pub student_id: Option<String>,
}

impl UploadForm {
    /// Read every field of the form. Unknown fields are skipped; blank text
    /// fields count as absent.
    pub async fn parse(multipart: &mut Multipart, max_file_size: usize) -> Result<Self, IngestError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| IngestError::Multipart(e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                IMAGE_FIELD => {
                    let file_name = field.file_name().map(str::to_string);
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| IngestError::Multipart(e.to_string()))?;
                    if data.len() > max_file_size {
                        return Err(IngestError::TooLarge {
                            size: data.len(),
                            max: max_file_size,
                        });
                    }
                    form.image = Some(UploadedFile { file_name, data });
                }
                NAME_FIELD | STUDENT_ID_FIELD => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| IngestError::Multipart(e.to_string()))?;
                    let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
                    if name == NAME_FIELD {
                        form.name = value;
                    } else {
                        form.student_id = value;
                    }
                }
                _ => {
                    tracing::debug!(field = %name, "ignoring unknown form field");
                }
            }
        }

        Ok(form)
    }

    pub fn require_image(&self) -> Result<&UploadedFile, IngestError> {
        self.image.as_ref().ok_or(IngestError::MissingImage)
    }

    /// Names of the student fields that are absent, in form order.
    pub fn missing_student_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.image.is_none() {
            missing.push(IMAGE_FIELD);
        }
        if self.name.is_none() {
            missing.push(NAME_FIELD);
        }
        if self.student_id.is_none() {
            missing.push(STUDENT_ID_FIELD);
        }
        missing
    }
}

/// Reduce a client filename to a safe single path component.
///
/// Directory parts are dropped and characters outside `[A-Za-z0-9._-]`
/// become `_`. Names that end up empty or made only of dots are rejected.
pub fn sanitize_filename(raw: &str) -> Result<String, IngestError> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') || cleaned.len() > MAX_FILENAME_LEN {
        return Err(IngestError::InvalidFilename(raw.to_string()));
    }
    Ok(cleaned)
}

/// Check the extension is an allowed JPEG one (case-insensitive); returns it lowercased.
pub fn validate_extension(file_name: &str) -> Result<String, IngestError> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(IngestError::InvalidExtension(file_name.to_string()))
    }
}

/// Student ids become store keys as-is, so they are validated, not rewritten.
pub fn validate_student_id(id: &str) -> Result<(), IngestError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_STUDENT_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        && !id.chars().all(|c| c == '.');
    if valid {
        Ok(())
    } else {
        Err(IngestError::InvalidStudentId(id.to_string()))
    }
}

/// Without a `student_id` the client filename is the store key, so like a
/// student id it must already be safe as sent; it is never rewritten.
pub fn validate_filename_key(raw: Option<&str>) -> Result<&str, IngestError> {
    let raw = raw.ok_or_else(|| IngestError::InvalidFilename(String::new()))?;
    match sanitize_filename(raw) {
        Ok(clean) if clean == raw => Ok(raw),
        _ => Err(IngestError::InvalidFilenameKey(raw.to_string())),
    }
}

/// A validated, persisted and decoded upload.
pub struct Ingested {
    /// Sanitized client filename.
    pub file_name: String,
    /// Server-generated name of the copy kept in the data directory.
    pub stored_file: String,
    pub image: GrayImage,
}

/// Validate the filename, keep the raw bytes under a fresh name in
/// `data_dir`, then decode to grayscale on the blocking pool.
///
/// The stored copy is kept whatever happens afterwards.
pub async fn ingest(data_dir: &Path, upload: &UploadedFile) -> Result<Ingested, IngestError> {
    let raw_name = upload
        .file_name
        .as_deref()
        .ok_or_else(|| IngestError::InvalidFilename(String::new()))?;
    let file_name = sanitize_filename(raw_name)?;
    let ext = validate_extension(&file_name)?;

    let stored_file = format!("{}.{ext}", uuid::Uuid::new_v4());
    tokio::fs::write(data_dir.join(&stored_file), &upload.data).await?;
    tracing::debug!(
        file_name = %file_name,
        stored_file = %stored_file,
        bytes = upload.data.len(),
        "upload persisted"
    );

    let image = decode(upload.data.clone()).await?;
    Ok(Ingested {
        file_name,
        stored_file,
        image,
    })
}

/// Decode image bytes to 8-bit grayscale.
pub async fn decode(data: Bytes) -> Result<GrayImage, IngestError> {
    let image = tokio::task::spawn_blocking(move || image::load_from_memory(&data)).await??;
    Ok(image.to_luma8())
}
