use actix_multipart::{Field, Multipart};
use actix_web::{HttpResponse, delete, post, web};
use common::{generate_storage_key, validate_folder};
use serde::Serialize;
use tokio_stream::StreamExt;

use super::UserId;
use crate::error::ApiError;
use crate::ipfs::PinnedFile;
use crate::response::{created, success};
use crate::state::AppState;

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "video/mp4",
    "video/webm",
    "audio/mpeg",
    "application/pdf",
    "application/json",
];

const DEFAULT_FOLDER: &str = "uploads";
const MAX_TEXT_FIELD_BYTES: usize = 1024;

pub fn is_allowed_mime(content_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&content_type.to_ascii_lowercase().as_str())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub key: String,
    pub url: String,
    pub size: usize,
    pub content_type: String,
    pub original_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipfs: Option<PinnedFile>,
}

struct ReceivedFile {
    original_name: String,
    content_type: String,
    bytes: Vec<u8>,
}

/// Running byte count across every part of one request.
struct UploadBudget {
    used: usize,
    limit: usize,
}

impl UploadBudget {
    fn take(&mut self, bytes: usize) -> Result<(), ApiError> {
        self.used += bytes;
        if self.used > self.limit {
            return Err(ApiError::BadRequest(format!(
                "Upload exceeds the limit of {} bytes",
                self.limit
            )));
        }
        Ok(())
    }
}

async fn read_field(field: &mut Field, budget: &mut UploadBudget) -> Result<Vec<u8>, ApiError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        budget.take(chunk.len())?;
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

async fn read_text_field(field: &mut Field, budget: &mut UploadBudget) -> Result<String, ApiError> {
    let bytes = read_field(field, budget).await?;
    if bytes.len() > MAX_TEXT_FIELD_BYTES {
        return Err(ApiError::BadRequest("Form field is too long".to_string()));
    }
    String::from_utf8(bytes)
        .map(|text| text.trim().to_string())
        .map_err(|_| ApiError::BadRequest("Form field is not valid UTF-8".to_string()))
}

fn parse_flag(value: &str) -> Result<bool, ApiError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(ApiError::BadRequest(format!(
            "pinToIpfs must be true or false, got '{}'",
            other
        ))),
    }
}

/// Accepts one or more `file` parts plus optional `folder` and `pinToIpfs`
/// text parts.
#[post("/upload")]
pub async fn upload_files(
    user: UserId,
    mut payload: Multipart,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let mut budget = UploadBudget {
        used: 0,
        limit: app_state.max_upload_bytes,
    };
    let mut files = Vec::new();
    let mut folder = DEFAULT_FOLDER.to_string();
    let mut pin_to_ipfs = false;

    while let Some(field) = payload.next().await {
        let mut field = field?;
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let original_name = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .unwrap_or("file")
                    .to_string();
                let content_type = field
                    .content_type()
                    .map(|mime| mime.essence_str().to_string())
                    .unwrap_or_default();
                if !is_allowed_mime(&content_type) {
                    log::warn!(
                        "User {} tried to upload {} as '{}'",
                        user.0,
                        original_name,
                        content_type
                    );
                    return Err(ApiError::BadRequest(format!(
                        "File type '{}' is not allowed",
                        content_type
                    )));
                }

                let bytes = read_field(&mut field, &mut budget).await?;
                if bytes.is_empty() {
                    return Err(ApiError::BadRequest(format!(
                        "File '{}' is empty",
                        original_name
                    )));
                }
                files.push(ReceivedFile {
                    original_name,
                    content_type,
                    bytes,
                });
            }
            "folder" => {
                let value = read_text_field(&mut field, &mut budget).await?;
                if !value.is_empty() {
                    folder = value;
                }
            }
            "pinToIpfs" => {
                let value = read_text_field(&mut field, &mut budget).await?;
                pin_to_ipfs = parse_flag(&value)?;
            }
            _ => {
                read_field(&mut field, &mut budget).await?;
            }
        }
    }

    if files.is_empty() {
        return Err(ApiError::BadRequest("No file provided".to_string()));
    }
    if !validate_folder(&folder)? {
        return Err(ApiError::BadRequest(format!("Invalid folder '{}'", folder)));
    }
    let ipfs = match (pin_to_ipfs, &app_state.ipfs) {
        (true, None) => {
            return Err(ApiError::BadRequest(
                "IPFS pinning is not configured".to_string(),
            ));
        }
        (true, Some(client)) => Some(client),
        (false, _) => None,
    };

    let mut uploaded = Vec::with_capacity(files.len());
    for file in files {
        let key = generate_storage_key(&folder, &file.original_name);
        app_state
            .storage
            .put(&key, &file.bytes)
            .await
            .map_err(|e| ApiError::internal("Failed to store file", e))?;
        app_state
            .db
            .record_upload(&key, &user.0, file.bytes.len(), &file.content_type)
            .await
            .map_err(|e| ApiError::internal("Failed to record upload", e))?;

        let pinned = match ipfs {
            Some(client) => Some(
                client
                    .pin(&file.original_name, &file.content_type, &file.bytes)
                    .await
                    .map_err(|e| ApiError::internal("Failed to pin file to IPFS", e))?,
            ),
            None => None,
        };

        log::info!(
            "User {} uploaded {} ({} bytes) as {}",
            user.0,
            file.original_name,
            file.bytes.len(),
            key
        );
        uploaded.push(UploadedFile {
            url: app_state.storage.public_url(&key),
            key,
            size: file.bytes.len(),
            content_type: file.content_type,
            original_name: file.original_name,
            ipfs: pinned,
        });
    }

    Ok(created(uploaded))
}

#[delete("/upload/{key:.*}")]
pub async fn delete_file(
    user: UserId,
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let key = path.into_inner();
    if app_state.storage.resolve(&key).is_none() {
        return Err(ApiError::BadRequest(format!("Invalid key '{}'", key)));
    }

    let owner = app_state
        .db
        .get_upload_owner(&key)
        .await
        .map_err(|e| ApiError::internal("Failed to look up file", e))?;
    match owner {
        None => return Err(ApiError::NotFound(format!("File '{}' not found", key))),
        Some(owner) if owner != user.0 => {
            log::warn!("User {} tried to delete {} owned by {}", user.0, key, owner);
            return Err(ApiError::Unauthorized(
                "Files can only be deleted by their uploader".to_string(),
            ));
        }
        Some(_) => {}
    }

    let deleted = app_state
        .storage
        .delete(&key)
        .await
        .map_err(|e| ApiError::internal("Failed to delete file", e))?;
    app_state
        .db
        .delete_upload(&key)
        .await
        .map_err(|e| ApiError::internal("Failed to delete upload record", e))?;
    if !deleted {
        return Err(ApiError::NotFound(format!("File '{}' not found", key)));
    }

    log::info!("User {} deleted {}", user.0, key);
    Ok(success(serde_json::json!({ "key": key, "deleted": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_allow_list() {
        assert!(is_allowed_mime("image/png"));
        assert!(is_allowed_mime("IMAGE/JPEG"));
        assert!(is_allowed_mime("application/pdf"));
        assert!(!is_allowed_mime("application/x-msdownload"));
        assert!(!is_allowed_mime("text/html"));
        assert!(!is_allowed_mime(""));
    }

    #[test]
    fn flags() {
        assert!(parse_flag("TRUE").unwrap());
        assert!(!parse_flag("").unwrap());
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn budget_is_shared_across_parts() {
        let mut budget = UploadBudget { used: 0, limit: 10 };
        assert!(budget.take(6).is_ok());
        assert!(budget.take(4).is_ok());
        assert!(budget.take(1).is_err());
    }
}
