//! Staged attachments and the upload pipeline.
//!
//! Files stage in order and upload strictly sequentially so the attached-file
//! text blocks land in staging order. A failed upload is logged and dropped
//! from both the id list and the augmentation; the turn still goes out with
//! whatever succeeded.

use std::io;
use std::path::Path;
use uuid::Uuid;

use crate::backend::Backend;

/// A locally held attachment not yet uploaded.
#[derive(Debug, Clone)]
pub struct StagedFile {
    /// Local handle; server ids only exist after upload.
    pub id: Uuid,
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl StagedFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Stage a file from disk; the MIME type is inferred from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> io::Result<StagedFile> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();
        Ok(StagedFile::new(name, mime_for_path(path), bytes))
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

/// MIME type inferred from a path extension; unknown extensions are treated
/// as opaque bytes.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        Some("txt") | Some("md") | Some("csv") | Some("py") | Some("js") | Some("html")
        | Some("css") | Some("c") | Some("cpp") | Some("java") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Ordered set of files staged for the next outgoing turn.
#[derive(Debug, Default)]
pub struct StagedFiles {
    files: Vec<StagedFile>,
}

impl StagedFiles {
    pub fn stage(&mut self, file: StagedFile) {
        self.files.push(file);
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    /// Drain everything in staging order; the store is empty afterwards.
    pub fn take_all(&mut self) -> Vec<StagedFile> {
        std::mem::take(&mut self.files)
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }
}

/// What the pipeline produced: server file ids of the uploads that succeeded
/// and the message body with attached-file text appended in upload order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub file_ids: Vec<i64>,
    pub message: String,
}

/// Append one attached-file text block to the outgoing message.
pub fn append_attachment_text(message: &mut String, filename: &str, extracted: &str) {
    message.push_str(&format!(
        "\n\n--- [attached file: {}] ---\n{}\n----------------------------------\n",
        filename, extracted
    ));
}

/// Upload `files` one at a time, in order. Non-image files with extracted
/// text augment the message in that same order. A per-file failure is logged
/// and the file is skipped; it never aborts the turn.
pub async fn upload_staged<B: Backend>(
    backend: &B,
    text: &str,
    files: &[StagedFile],
) -> UploadOutcome {
    let mut file_ids = Vec::new();
    let mut message = text.to_string();

    for file in files {
        match backend
            .upload_file(&file.name, &file.mime, file.bytes.clone())
            .await
        {
            Ok(reply) if reply.success => {
                if let Some(id) = reply.file_id {
                    file_ids.push(id);
                }
                if let Some(extracted) = reply.extracted_text.as_deref() {
                    if !file.is_image() && !extracted.is_empty() {
                        let name = reply.filename.as_deref().unwrap_or(&file.name);
                        append_attachment_text(&mut message, name, extracted);
                    }
                }
            }
            Ok(reply) => {
                log::warn!(
                    "upload of {} rejected: {}",
                    file.name,
                    reply.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            Err(e) => {
                log::warn!("upload of {} failed: {}", file.name, e);
            }
        }
    }

    UploadOutcome { file_ids, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_preserves_order_and_take_all_drains() {
        let mut staged = StagedFiles::default();
        staged.stage(StagedFile::new("a.txt", "text/plain", vec![1]));
        staged.stage(StagedFile::new("b.png", "image/png", vec![2]));
        assert_eq!(staged.len(), 2);

        let taken = staged.take_all();
        assert_eq!(taken[0].name, "a.txt");
        assert_eq!(taken[1].name, "b.png");
        assert!(staged.is_empty());
    }

    #[test]
    fn image_detection_uses_the_mime_prefix() {
        assert!(StagedFile::new("x", "image/jpeg", vec![]).is_image());
        assert!(!StagedFile::new("x", "application/pdf", vec![]).is_image());
    }

    #[test]
    fn mime_inference_covers_the_accepted_extensions() {
        assert_eq!(mime_for_path(Path::new("shot.PNG")), "image/png");
        assert_eq!(mime_for_path(Path::new("notes.md")), "text/plain");
        assert_eq!(mime_for_path(Path::new("data.json")), "application/json");
        assert_eq!(
            mime_for_path(Path::new("archive.zip")),
            "application/octet-stream"
        );
        assert_eq!(mime_for_path(Path::new("no_extension")), "application/octet-stream");
    }

    #[test]
    fn attachment_blocks_append_in_call_order() {
        let mut message = "question".to_string();
        append_attachment_text(&mut message, "a.txt", "first");
        append_attachment_text(&mut message, "b.md", "second");

        let a = message.find("[attached file: a.txt]").unwrap();
        let b = message.find("[attached file: b.md]").unwrap();
        assert!(message.starts_with("question"));
        assert!(a < b);
        assert!(message.contains("\nfirst\n"));
        assert!(message.contains("\nsecond\n"));
    }
}
