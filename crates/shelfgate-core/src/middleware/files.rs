//! Upload validation.
//!
//! Each uploaded file goes through a [`FileScanner`]. A report that is structurally
//! invalid rejects the request before its score is looked at; a valid report still has to
//! reach [`FileUploadOptions::min_security_score`].

use crate::middleware::errors::{ErrorCode, MiddlewareError};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, warn};

pub const DEFAULT_MIN_SECURITY_SCORE: u8 = 70;
pub const DEFAULT_MAX_FILE_SIZE_BYTES: usize = 10 * 1024 * 1024;

const MAGIC_MISMATCH_PENALTY: u8 = 40;
const EXTENSION_MISMATCH_PENALTY: u8 = 20;
const SCRIPT_MARKER_PENALTY: u8 = 50;
const DOUBLE_EXTENSION_PENALTY: u8 = 30;

/// One file taken from a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field_name: String,
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadedFile {
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn extension(&self) -> Option<String> {
        self.file_name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
    }
}

/// Files parsed from the request, attached as a request extension by the host.
#[derive(Debug, Clone, Default)]
pub struct UploadedFiles(pub Vec<UploadedFile>);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileScanReport {
    pub is_valid: bool,
    pub security_score: u8,
    pub reasons: Vec<String>,
}

#[derive(Error, Debug, Clone)]
pub enum ScanError {
    #[error("Scanner unavailable: {0}")]
    Unavailable(String),

    #[error("Scan failed: {0}")]
    Internal(String),
}

#[async_trait]
pub trait FileScanner: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ScanError`] if the file could not be scanned at all.
    async fn validate_file(&self, file: &UploadedFile) -> Result<FileScanReport, ScanError>;
}

struct AllowedType {
    mime: &'static str,
    extensions: &'static [&'static str],
    magic: &'static [&'static [u8]],
}

const ALLOWED_TYPES: &[AllowedType] = &[
    AllowedType { mime: "image/jpeg", extensions: &["jpg", "jpeg"], magic: &[&[0xFF, 0xD8, 0xFF]] },
    AllowedType {
        mime: "image/png",
        extensions: &["png"],
        magic: &[&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]],
    },
    AllowedType { mime: "image/gif", extensions: &["gif"], magic: &[b"GIF87a", b"GIF89a"] },
    AllowedType { mime: "image/webp", extensions: &["webp"], magic: &[b"RIFF"] },
    AllowedType { mime: "application/pdf", extensions: &["pdf"], magic: &[b"%PDF-"] },
    AllowedType { mime: "text/csv", extensions: &["csv"], magic: &[] },
    AllowedType { mime: "text/plain", extensions: &["txt"], magic: &[] },
];

const SCRIPT_MARKERS: &[&[u8]] =
    &[b"<script", b"<?php", b"javascript:", b"eval(", b"<%", b"#!/bin/", b"powershell"];

const EXECUTABLE_EXTENSIONS: &[&str] =
    &["exe", "php", "js", "sh", "bat", "cmd", "ps1", "jar", "py", "pl", "cgi", "html", "htm"];

fn contains_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w.eq_ignore_ascii_case(needle))
}

/// Allowlist and signature checks over the raw bytes. No external service involved.
#[derive(Debug, Clone)]
pub struct SignatureScanner {
    max_size_bytes: usize,
}

impl Default for SignatureScanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_SIZE_BYTES)
    }
}

impl SignatureScanner {
    #[must_use]
    pub fn new(max_size_bytes: usize) -> Self {
        Self { max_size_bytes }
    }

    #[must_use]
    pub fn scan(&self, file: &UploadedFile) -> FileScanReport {
        let mut reasons = Vec::new();
        let mime = file.content_type.split(';').next().unwrap_or_default().trim();
        let mime = mime.to_ascii_lowercase();

        if file.data.is_empty() {
            reasons.push("File is empty".to_string());
        }
        if file.size() > self.max_size_bytes {
            reasons.push(format!("File exceeds the {} byte limit", self.max_size_bytes));
        }
        let Some(allowed) = ALLOWED_TYPES.iter().find(|t| t.mime == mime) else {
            reasons.push(format!("File type {mime} is not allowed"));
            return FileScanReport { is_valid: false, security_score: 0, reasons };
        };
        if !reasons.is_empty() {
            return FileScanReport { is_valid: false, security_score: 0, reasons };
        }

        let mut score: u8 = 100;

        if !allowed.magic.is_empty() && !allowed.magic.iter().any(|m| file.data.starts_with(m)) {
            score = score.saturating_sub(MAGIC_MISMATCH_PENALTY);
            reasons.push(format!("File content does not match {mime}"));
        }

        let extension = file.extension();
        if !extension.as_deref().is_some_and(|ext| allowed.extensions.contains(&ext)) {
            score = score.saturating_sub(EXTENSION_MISMATCH_PENALTY);
            reasons.push(format!("File extension does not match {mime}"));
        }

        let inner_executable = file
            .file_name
            .split('.')
            .collect::<Vec<_>>()
            .iter()
            .skip(1)
            .rev()
            .skip(1)
            .any(|part| EXECUTABLE_EXTENSIONS.contains(&part.to_ascii_lowercase().as_str()));
        if inner_executable {
            score = score.saturating_sub(DOUBLE_EXTENSION_PENALTY);
            reasons.push("File name hides an executable extension".to_string());
        }

        if SCRIPT_MARKERS.iter().any(|marker| contains_ignore_case(&file.data, marker)) {
            score = score.saturating_sub(SCRIPT_MARKER_PENALTY);
            reasons.push("File contains embedded script content".to_string());
        }

        FileScanReport { is_valid: true, security_score: score, reasons }
    }
}

#[async_trait]
impl FileScanner for SignatureScanner {
    async fn validate_file(&self, file: &UploadedFile) -> Result<FileScanReport, ScanError> {
        Ok(self.scan(file))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileUploadOptions {
    pub required: bool,
    pub min_security_score: u8,
}

impl Default for FileUploadOptions {
    fn default() -> Self {
        Self { required: true, min_security_score: DEFAULT_MIN_SECURITY_SCORE }
    }
}

/// One report per accepted file, in upload order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileValidationResults(pub Vec<(String, FileScanReport)>);

/// Scans every file and checks the reports against `options`.
///
/// # Errors
///
/// - `FILE_REQUIRED` if no file was uploaded and one is required
/// - `FILE_VALIDATION_ERROR` for a structurally invalid file
/// - `FILE_SECURITY_RISK` for a file scoring below the minimum
/// - `FILE_VALIDATION_SYSTEM_ERROR` if the scanner fails
pub async fn validate_uploads(
    scanner: &dyn FileScanner,
    files: Option<&UploadedFiles>,
    options: FileUploadOptions,
) -> Result<FileValidationResults, MiddlewareError> {
    let files = files.map(|f| f.0.as_slice()).unwrap_or_default();

    if files.is_empty() {
        if options.required {
            return Err(MiddlewareError::new(ErrorCode::FileRequired, "File upload is required"));
        }
        debug!("no files uploaded, upload optional");
        return Ok(FileValidationResults::default());
    }

    let mut results = Vec::with_capacity(files.len());
    for file in files {
        let report = scanner.validate_file(file).await.map_err(|e| {
            error!(error = %e, file = %file.file_name, "file scanner failed");
            let message = "File validation system error";
            MiddlewareError::new(ErrorCode::FileValidationSystemError, message)
        })?;

        if !report.is_valid {
            warn!(file = %file.file_name, reasons = ?report.reasons, "invalid file rejected");
            let details = json!({ "file": file.file_name, "reasons": report.reasons });
            let message = "File validation failed";
            let err = MiddlewareError::new(ErrorCode::FileValidationError, message);
            return Err(err.with_details(details));
        }

        if report.security_score < options.min_security_score {
            warn!(
                file = %file.file_name,
                score = report.security_score,
                min = options.min_security_score,
                "file failed security check"
            );
            return Err(MiddlewareError::new(
                ErrorCode::FileSecurityRisk,
                "File failed security validation",
            )
            .with_details(json!({
                "file": file.file_name,
                "securityScore": report.security_score,
                "reasons": report.reasons,
            })));
        }

        results.push((file.file_name.clone(), report));
    }

    Ok(FileValidationResults(results))
}
