//! Attachment uploads
//!
//! Multipart bodies are parsed with `multer`; files are written under
//! `UPLOAD_DIR/{requestId}/{random}-{name}` and recorded on the request with
//! a path relative to the upload root.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::ready;
use futures::stream::once;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

use crate::requests::Attachment;
use crate::types::KrishiError;

const MAX_FILE_NAME_LEN: usize = 100;

/// A file received but not yet written
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Parsed `multipart/form-data` body
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<PendingFile>,
}

impl MultipartForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

pub fn is_multipart(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        ct.trim_start()
            .to_ascii_lowercase()
            .starts_with("multipart/form-data")
    })
}

/// Parse a buffered multipart body
pub async fn parse_multipart(
    content_type: &str,
    body: Bytes,
) -> Result<MultipartForm, KrishiError> {
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| KrishiError::BadRequest(format!("Failed to parse boundary: {e}")))?;

    let stream = once(ready(Ok::<_, std::io::Error>(body)));
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut form = MultipartForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field
                    .content_type()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let data = field.bytes().await?;

                // Browsers send an empty part when no file was chosen
                if file_name.is_empty() && data.is_empty() {
                    continue;
                }
                debug!(field = %name, file = %file_name, size = data.len(), "Received upload");
                form.files.push(PendingFile {
                    file_name,
                    content_type,
                    data,
                });
            }
            None => {
                let text = field.text().await?;
                form.fields.insert(name, text);
            }
        }
    }

    Ok(form)
}

/// Make a client-supplied name safe to use as a path component
pub fn sanitize_file_name(name: &str) -> String {
    // Some clients send the full local path
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.chars().take(MAX_FILE_NAME_LEN).collect()
    }
}

/// Writes attachment files to disk
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write `files` for `request_id`, returning their attachment records.
    ///
    /// All or nothing: if one write fails, the files already written are
    /// removed before the error is returned.
    pub async fn save_all(
        &self,
        request_id: &str,
        files: &[PendingFile],
        now: DateTime<Utc>,
    ) -> Result<Vec<Attachment>, KrishiError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        Uuid::parse_str(request_id)
            .map_err(|_| KrishiError::Validation(format!("Invalid request id: {request_id}")))?;

        let dir = self.root.join(request_id);
        tokio::fs::create_dir_all(&dir).await?;

        let mut attachments = Vec::with_capacity(files.len());
        for file in files {
            let display_name = sanitize_file_name(&file.file_name);
            let prefix = Uuid::new_v4().simple().to_string();
            let stored_name = format!("{}-{}", &prefix[..8], display_name);

            if let Err(e) = tokio::fs::write(dir.join(&stored_name), &file.data).await {
                self.remove(&attachments).await;
                return Err(e.into());
            }

            attachments.push(Attachment {
                file_name: display_name,
                file_path: format!("{request_id}/{stored_name}"),
                file_type: file.content_type.clone(),
                uploaded_at: now,
            });
        }

        Ok(attachments)
    }

    /// Delete the files behind `attachments`
    pub async fn remove(&self, attachments: &[Attachment]) {
        for attachment in attachments {
            let path = self.root.join(&attachment.file_path);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                debug!("Could not remove {}: {}", path.display(), e);
            }
        }
    }

    /// Remove everything stored for a request; used when its creation fails
    pub async fn discard(&self, request_id: &str) {
        if Uuid::parse_str(request_id).is_err() {
            return;
        }
        let dir = self.root.join(request_id);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            debug!("Could not remove {}: {}", dir.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "X-KRISHI-BOUNDARY";

    fn multipart_body() -> Bytes {
        let body = format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"title\"\r\n\r\n\
             Pump broken\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"attachments\"; filename=\"pump photo.jpg\"\r\n\
             Content-Type: image/jpeg\r\n\r\n\
             JPEGDATA\r\n\
             --{b}--\r\n",
            b = BOUNDARY
        );
        Bytes::from(body)
    }

    #[tokio::test]
    async fn test_parse_fields_and_files() {
        let ct = format!("multipart/form-data; boundary={BOUNDARY}");
        let form = parse_multipart(&ct, multipart_body()).await.unwrap();

        assert_eq!(form.field("title"), Some("Pump broken"));
        assert_eq!(form.files.len(), 1);
        assert_eq!(form.files[0].file_name, "pump photo.jpg");
        assert_eq!(form.files[0].content_type, "image/jpeg");
        assert_eq!(&form.files[0].data[..], b"JPEGDATA");
    }

    #[tokio::test]
    async fn test_missing_boundary_is_bad_request() {
        let err = parse_multipart("multipart/form-data", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, KrishiError::BadRequest(_)));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\soil test.pdf"), "soil_test.pdf");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[test]
    fn test_is_multipart() {
        assert!(is_multipart(Some("multipart/form-data; boundary=abc")));
        assert!(!is_multipart(Some("application/json")));
        assert!(!is_multipart(None));
    }

    #[tokio::test]
    async fn test_save_all_writes_under_request_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        let request_id = Uuid::new_v4().to_string();
        let files = vec![PendingFile {
            file_name: "leaf.png".into(),
            content_type: "image/png".into(),
            data: Bytes::from_static(b"PNG"),
        }];

        let saved = store.save_all(&request_id, &files, Utc::now()).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].file_name, "leaf.png");
        assert!(saved[0].file_path.starts_with(&request_id));

        let on_disk = dir.path().join(&saved[0].file_path);
        assert_eq!(std::fs::read(on_disk).unwrap(), b"PNG");

        store.discard(&request_id).await;
        assert!(!dir.path().join(&request_id).exists());
    }

    #[tokio::test]
    async fn test_save_rejects_non_uuid_request_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        let files = vec![PendingFile {
            file_name: "x".into(),
            content_type: "text/plain".into(),
            data: Bytes::from_static(b"x"),
        }];
        assert!(store.save_all("../escape", &files, Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_deletes_only_listed_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        let request_id = Uuid::new_v4().to_string();
        let files = vec![
            PendingFile {
                file_name: "a.txt".into(),
                content_type: "text/plain".into(),
                data: Bytes::from_static(b"a"),
            },
            PendingFile {
                file_name: "b.txt".into(),
                content_type: "text/plain".into(),
                data: Bytes::from_static(b"b"),
            },
        ];

        let saved = store.save_all(&request_id, &files, Utc::now()).await.unwrap();
        store.remove(&saved[..1]).await;

        assert!(!dir.path().join(&saved[0].file_path).exists());
        assert!(dir.path().join(&saved[1].file_path).exists());
    }
}
