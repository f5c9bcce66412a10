// Microsoft Graph (OneDrive) Adapter
// Session-chunked upload: every non-final chunk must be a multiple of the
// provider's 327,680-byte unit. Conflicts resolve by rename.

use bytes::Bytes;
use reqwest::header;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    chunk_ranges, content_range, CancelProbe, DownloadedFile, ProviderError, RemoteItem,
    StorageAdapter,
};

const API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Graph's mandated upload granularity
pub const UPLOAD_UNIT: u64 = 327_680;
/// Chunk size used for session uploads: 32 units = 10 MiB
pub const CHUNK_SIZE: u64 = UPLOAD_UNIT * 32;

// Compile-time guarantee that the chunk size respects the unit rule
const _: () = assert!(CHUNK_SIZE % UPLOAD_UNIT == 0);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    id: String,
    name: String,
    size: Option<i64>,
    web_url: Option<String>,
    file: Option<DriveItemFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItemFile {
    mime_type: Option<String>,
    hashes: Option<DriveItemHashes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItemHashes {
    #[serde(rename = "quickXorHash")]
    quick_xor_hash: Option<String>,
    sha1_hash: Option<String>,
}

impl From<DriveItem> for RemoteItem {
    fn from(item: DriveItem) -> Self {
        let (mime_type, checksum) = match item.file {
            Some(f) => {
                let checksum = f
                    .hashes
                    .and_then(|h| h.quick_xor_hash.or(h.sha1_hash));
                (f.mime_type, checksum)
            },
            None => (None, None),
        };
        RemoteItem {
            id: item.id,
            name: item.name,
            mime_type,
            size: item.size,
            checksum,
            web_url: item.web_url,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSession {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct ChildrenPage {
    value: Vec<DriveItem>,
}

pub struct GraphAdapter {
    http_client: reqwest::Client,
}

impl Default for GraphAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphAdapter {
    pub fn new() -> Self {
        let timeout = crate::app_config::config().transfer.http_timeout_secs;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .user_agent("HopSync-Graph-Client/1.0")
            .build()
            .unwrap_or_default();

        Self { http_client }
    }

    fn item_path(folder: &str, name: &str) -> String {
        // "root" addresses the drive root; anything else is an item id
        if folder == "root" {
            format!("{}/me/drive/root:/{}:", API_BASE, name)
        } else {
            format!("{}/me/drive/items/{}:/{}:", API_BASE, folder, name)
        }
    }

    fn children_url(folder: &str) -> String {
        if folder == "root" {
            format!("{}/me/drive/root/children", API_BASE)
        } else {
            format!("{}/me/drive/items/{}/children", API_BASE, folder)
        }
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

    /// Best-effort follow-up fetch for the user-facing link when the final
    /// upload response lacked one. A failure here never fails the transfer.
    async fn fetch_web_url(&self, access_token: &str, item_id: &str) -> Option<String> {
        let result = self
            .http_client
            .get(format!("{}/me/drive/items/{}", API_BASE, item_id))
            .query(&[("$select", "id,webUrl")])
            .bearer_auth(access_token)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct WebUrlOnly {
                    web_url: Option<String>,
                }
                response
                    .json::<WebUrlOnly>()
                    .await
                    .ok()
                    .and_then(|i| i.web_url)
            },
            Ok(response) => {
                warn!(
                    "webUrl follow-up for {} returned {}",
                    item_id,
                    response.status()
                );
                None
            },
            Err(e) => {
                warn!("webUrl follow-up for {} failed: {}", item_id, e);
                None
            },
        }
    }

    /// Simple content PUT for empty files. An upload session never
    /// completes with zero chunks, so a 0-byte file must skip the session
    /// entirely.
    async fn upload_empty(
        &self,
        access_token: &str,
        file: &DownloadedFile,
        target_folder: &str,
    ) -> Result<RemoteItem, ProviderError> {
        let response = self
            .http_client
            .put(format!(
                "{}/content",
                Self::item_path(target_folder, &file.name)
            ))
            .query(&[("@microsoft.graph.conflictBehavior", "rename")])
            .bearer_auth(access_token)
            .header(header::CONTENT_LENGTH, 0)
            .body(Vec::new())
            .send()
            .await?;
        let response = Self::fail_on_status(response).await?;

        let mut uploaded: RemoteItem = response.json::<DriveItem>().await?.into();
        if uploaded.web_url.is_none() {
            uploaded.web_url = self.fetch_web_url(access_token, &uploaded.id).await;
        }
        info!("Graph empty-file upload complete: {}", uploaded.id);
        Ok(uploaded)
    }
}

#[async_trait::async_trait]
impl StorageAdapter for GraphAdapter {
    async fn download(
        &self,
        access_token: &str,
        item: &RemoteItem,
    ) -> Result<DownloadedFile, ProviderError> {
        let response = self
            .http_client
            .get(format!("{}/me/drive/items/{}/content", API_BASE, item.id))
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

        let total = file.data.len() as u64;
        if total == 0 {
            return self.upload_empty(access_token, file, target_folder).await;
        }

        let session_body = json!({
            "item": {
                "@microsoft.graph.conflictBehavior": "rename",
                "name": file.name,
            }
        });

        let response = self
            .http_client
            .post(format!(
                "{}/createUploadSession",
                Self::item_path(target_folder, &file.name)
            ))
            .bearer_auth(access_token)
            .json(&session_body)
            .send()
            .await?;
        let response = Self::fail_on_status(response).await?;
        let session: UploadSession = response.json().await?;

        debug!("Graph upload session opened for '{}' ({} bytes)", file.name, total);

        for range in chunk_ranges(total, CHUNK_SIZE) {
            probe.check().await?;

            let chunk: Bytes = file.data.slice(range.start as usize..range.end as usize);
            let response = self
                .http_client
                .put(&session.upload_url)
                .header(header::CONTENT_RANGE, content_range(&range, total))
                .header(header::CONTENT_LENGTH, chunk.len())
                .body(chunk)
                .send()
                .await?;

            let status = response.status().as_u16();
            match status {
                // 202 Accepted: session expects more chunks
                202 => continue,
                200 | 201 => {
                    let mut uploaded: RemoteItem = response.json::<DriveItem>().await?.into();
                    if uploaded.web_url.is_none() {
                        uploaded.web_url = self.fetch_web_url(access_token, &uploaded.id).await;
                    }
                    info!("Graph session upload complete: {}", uploaded.id);
                    return Ok(uploaded);
                },
                401 => return Err(ProviderError::Unauthorized),
                _ => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ProviderError::Status { status, body });
                },
            }
        }

        Err(ProviderError::Session(
            "upload session ended without final metadata".to_string(),
        ))
    }

    async fn list_children_by_name(
        &self,
        access_token: &str,
        folder: &str,
        name: &str,
    ) -> Result<Vec<RemoteItem>, ProviderError> {
        let response = self
            .http_client
            .get(Self::children_url(folder))
            .query(&[(
                "$select",
                "id,name,size,webUrl,file",
            )])
            .bearer_auth(access_token)
            .send()
            .await?;
        let response = Self::fail_on_status(response).await?;

        let page: ChildrenPage = response.json().await?;
        Ok(page
            .value
            .into_iter()
            .map(RemoteItem::from)
            .filter(|item| item.name == name)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size_is_unit_multiple() {
        assert_eq!(CHUNK_SIZE % UPLOAD_UNIT, 0);
        assert_eq!(CHUNK_SIZE, 10_485_760);
    }

    #[test]
    fn test_every_nonfinal_chunk_is_unit_multiple() {
        // 25 MiB file: two full chunks and a 5 MiB tail
        let total = 25 * 1024 * 1024;
        let ranges = chunk_ranges(total, CHUNK_SIZE);
        assert_eq!(ranges.len(), 3);
        for r in &ranges[..ranges.len() - 1] {
            assert_eq!((r.end - r.start) % UPLOAD_UNIT, 0);
        }
        assert_eq!(ranges.last().unwrap().end, total);
    }

    #[test]
    fn test_empty_file_yields_no_session_chunks() {
        // Zero bytes means zero chunks, which is why empty files take the
        // simple content PUT instead of a session
        assert!(chunk_ranges(0, CHUNK_SIZE).is_empty());
    }

    #[test]
    fn test_item_path_addressing() {
        assert_eq!(
            GraphAdapter::item_path("root", "a.bin"),
            "https://graph.microsoft.com/v1.0/me/drive/root:/a.bin:"
        );
        assert_eq!(
            GraphAdapter::item_path("01ABCDEF", "a.bin"),
            "https://graph.microsoft.com/v1.0/me/drive/items/01ABCDEF:/a.bin:"
        );
    }

    #[test]
    fn test_drive_item_checksum_preference() {
        let item: DriveItem = serde_json::from_value(serde_json::json!({
            "id": "x",
            "name": "a.bin",
            "size": 42,
            "file": {
                "mimeType": "application/octet-stream",
                "hashes": {
                    "quickXorHash": "qxh==",
                    "sha1Hash": "sha1"
                }
            }
        }))
        .unwrap();
        let remote = RemoteItem::from(item);
        // quickXorHash wins when both are present
        assert_eq!(remote.checksum.as_deref(), Some("qxh=="));

        let folder: DriveItem = serde_json::from_value(serde_json::json!({
            "id": "y",
            "name": "folder"
        }))
        .unwrap();
        assert_eq!(RemoteItem::from(folder).checksum, None);
    }
}
