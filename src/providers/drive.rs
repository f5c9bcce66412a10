// Google Drive Adapter
// Simple multipart upload below 5 MiB, three-step resumable protocol above.
// Workspace-native documents are exported to an interchange format on
// download; they have no raw byte representation.

use bytes::Bytes;
use reqwest::header;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use super::{
    chunk_ranges, content_range, CancelProbe, DownloadedFile, ProviderError, RemoteItem,
    StorageAdapter,
};

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Files at or above this size use the resumable protocol
pub const SIMPLE_UPLOAD_THRESHOLD: u64 = 5 * 1024 * 1024;
/// Resumable chunk size; Drive requires a multiple of 256 KiB
pub const RESUMABLE_CHUNK_SIZE: u64 = 256 * 1024;

const NATIVE_MIME_PREFIX: &str = "application/vnd.google-apps.";

/// Export target for a Workspace-native document: interchange MIME type
/// and file extension. PDF is the fallback for types with no Office
/// equivalent.
pub fn export_format(native_mime: &str) -> (&'static str, &'static str) {
    match native_mime {
        "application/vnd.google-apps.document" => (
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "docx",
        ),
        "application/vnd.google-apps.spreadsheet" => (
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "xlsx",
        ),
        "application/vnd.google-apps.presentation" => (
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "pptx",
        ),
        _ => ("application/pdf", "pdf"),
    }
}

pub fn is_native_mime(mime: &str) -> bool {
    mime.starts_with(NATIVE_MIME_PREFIX)
}

/// Append the export extension unless the name already carries it
fn exported_name(name: &str, extension: &str) -> String {
    let suffix = format!(".{}", extension);
    if name.to_lowercase().ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{}{}", name, suffix)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: Option<String>,
    size: Option<String>,
    md5_checksum: Option<String>,
    web_view_link: Option<String>,
}

impl From<DriveFile> for RemoteItem {
    fn from(f: DriveFile) -> Self {
        RemoteItem {
            id: f.id,
            name: f.name,
            mime_type: f.mime_type,
            size: f.size.and_then(|s| s.parse().ok()),
            checksum: f.md5_checksum,
            web_url: f.web_view_link,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    files: Vec<DriveFile>,
}

pub struct DriveAdapter {
    http_client: reqwest::Client,
}

impl Default for DriveAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DriveAdapter {
    pub fn new() -> Self {
        let timeout = crate::app_config::config().transfer.http_timeout_secs;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .user_agent("HopSync-Drive-Client/1.0")
            .build()
            .unwrap_or_default();

        Self { http_client }
    }

    async fn fail_on_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Simple upload: one multipart/related request carrying metadata and
    /// media
    async fn upload_simple(
        &self,
        access_token: &str,
        file: &DownloadedFile,
        target_folder: &str,
    ) -> Result<RemoteItem, ProviderError> {
        let metadata = json!({
            "name": file.name,
            "parents": [target_folder],
        });

        // Drive's multipart upload wants multipart/related, which reqwest's
        // form builder does not produce; assemble the body by hand.
        let boundary = format!("hopsync_{}", uuid::Uuid::new_v4().simple());
        let media_type = file
            .mime_type
            .as_deref()
            .unwrap_or("application/octet-stream");

        let mut body: Vec<u8> = Vec::with_capacity(file.data.len() + 512);
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: {t}\r\n\r\n",
                b = boundary,
                m = metadata,
                t = media_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(&file.data);
        body.extend_from_slice(format!("\r\n--{}--", boundary).as_bytes());

        let response = self
            .http_client
            .post(format!("{}/files?uploadType=multipart", UPLOAD_BASE))
            .bearer_auth(access_token)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await?;

        let response = Self::fail_on_status(response).await?;
        let uploaded: DriveFile = response.json().await?;
        Ok(uploaded.into())
    }

    /// Resumable upload: initiate a session, then PUT fixed-size chunks
    /// with explicit byte ranges until the final chunk returns metadata
    async fn upload_resumable(
        &self,
        access_token: &str,
        file: &DownloadedFile,
        target_folder: &str,
        probe: &CancelProbe,
    ) -> Result<RemoteItem, ProviderError> {
        let total = file.data.len() as u64;
        let metadata = json!({
            "name": file.name,
            "parents": [target_folder],
        });

        let response = self
            .http_client
            .post(format!("{}/files?uploadType=resumable", UPLOAD_BASE))
            .bearer_auth(access_token)
            .header("X-Upload-Content-Length", total)
            .json(&metadata)
            .send()
            .await?;
        let response = Self::fail_on_status(response).await?;

        let session_url = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::Session("resumable initiation returned no session URL".to_string())
            })?;

        debug!("Drive resumable session opened for '{}' ({} bytes)", file.name, total);

        for range in chunk_ranges(total, RESUMABLE_CHUNK_SIZE) {
            probe.check().await?;

            let chunk: Bytes = file.data.slice(range.start as usize..range.end as usize);
            let response = self
                .http_client
                .put(&session_url)
                .header(header::CONTENT_RANGE, content_range(&range, total))
                .header(header::CONTENT_LENGTH, chunk.len())
                .body(chunk)
                .send()
                .await?;

            let status = response.status().as_u16();
            match status {
                // 308 Resume Incomplete: keep sending
                308 => continue,
                200 | 201 => {
                    let uploaded: DriveFile = response.json().await?;
                    info!("Drive resumable upload complete: {}", uploaded.id);
                    return Ok(uploaded.into());
                },
                401 => return Err(ProviderError::Unauthorized),
                _ => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ProviderError::Status { status, body });
                },
            }
        }

        // Every chunk was accepted with 308 but none returned metadata
        Err(ProviderError::Session(
            "resumable upload ended without final metadata".to_string(),
        ))
    }
}

#[async_trait::async_trait]
impl StorageAdapter for DriveAdapter {
    async fn download(
        &self,
        access_token: &str,
        item: &RemoteItem,
    ) -> Result<DownloadedFile, ProviderError> {
        let native = item
            .mime_type
            .as_deref()
            .filter(|m| is_native_mime(m));

        if let Some(mime) = native {
            let (export_mime, extension) = export_format(mime);
            let response = self
                .http_client
                .get(format!("{}/files/{}/export", API_BASE, item.id))
                .query(&[("mimeType", export_mime)])
                .bearer_auth(access_token)
                .send()
                .await?;
            let response = Self::fail_on_status(response).await?;
            let data = response.bytes().await?;

            return Ok(DownloadedFile {
                name: exported_name(&item.name, extension),
                mime_type: Some(export_mime.to_string()),
                data,
            });
        }

        let response = self
            .http_client
            .get(format!("{}/files/{}", API_BASE, item.id))
            .query(&[("alt", "media")])
            .bearer_auth(access_token)
            .send()
            .await?;
        let response = Self::fail_on_status(response).await?;
        let data = response.bytes().await?;

        Ok(DownloadedFile {
            name: item.name.clone(),
            mime_type: item.mime_type.clone(),
            data,
        })
    }

    async fn upload(
        &self,
        access_token: &str,
        file: &DownloadedFile,
        target_folder: &str,
        probe: &CancelProbe,
    ) -> Result<RemoteItem, ProviderError> {
        probe.check().await?;

        if (file.data.len() as u64) < SIMPLE_UPLOAD_THRESHOLD {
            self.upload_simple(access_token, file, target_folder).await
        } else {
            self.upload_resumable(access_token, file, target_folder, probe)
                .await
        }
    }

    async fn list_children_by_name(
        &self,
        access_token: &str,
        folder: &str,
        name: &str,
    ) -> Result<Vec<RemoteItem>, ProviderError> {
        // Drive query strings quote with single quotes; escape them in the
        // file name
        let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
        let query = format!(
            "name = '{}' and '{}' in parents and trashed = false",
            escaped, folder
        );

        let response = self
            .http_client
            .get(format!("{}/files", API_BASE))
            .query(&[
                ("q", query.as_str()),
                (
                    "fields",
                    "files(id,name,mimeType,size,md5Checksum,webViewLink)",
                ),
            ])
            .bearer_auth(access_token)
            .send()
            .await?;
        let response = Self::fail_on_status(response).await?;

        let list: DriveFileList = response.json().await?;
        Ok(list.files.into_iter().map(RemoteItem::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_mapping() {
        assert_eq!(
            export_format("application/vnd.google-apps.document").1,
            "docx"
        );
        assert_eq!(
            export_format("application/vnd.google-apps.spreadsheet").1,
            "xlsx"
        );
        assert_eq!(
            export_format("application/vnd.google-apps.presentation").1,
            "pptx"
        );
        // Drawings and anything else fall back to PDF
        assert_eq!(export_format("application/vnd.google-apps.drawing").1, "pdf");
    }

    #[test]
    fn test_native_mime_detection() {
        assert!(is_native_mime("application/vnd.google-apps.document"));
        assert!(!is_native_mime("application/pdf"));
        assert!(!is_native_mime("image/png"));
    }

    #[test]
    fn test_exported_name() {
        assert_eq!(exported_name("Quarterly Plan", "docx"), "Quarterly Plan.docx");
        assert_eq!(exported_name("Report.DOCX", "docx"), "Report.DOCX");
    }

    #[test]
    fn test_resumable_chunking_uses_256kib() {
        let ranges = chunk_ranges(SIMPLE_UPLOAD_THRESHOLD, RESUMABLE_CHUNK_SIZE);
        assert_eq!(ranges.len(), 20);
        assert!(ranges.iter().all(|r| r.end - r.start == 256 * 1024));
    }

    #[test]
    fn test_drive_file_size_parses_from_string() {
        let parsed: DriveFile = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "name": "report.bin",
            "mimeType": "application/octet-stream",
            "size": "1048576",
            "md5Checksum": "d41d8cd98f00b204e9800998ecf8427e"
        }))
        .unwrap();
        let item = RemoteItem::from(parsed);
        assert_eq!(item.size, Some(1_048_576));
        assert_eq!(
            item.checksum.as_deref(),
            Some("d41d8cd98f00b204e9800998ecf8427e")
        );
    }
}
