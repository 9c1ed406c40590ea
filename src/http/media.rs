//! Media endpoints: list, serve and upload.

use std::sync::Arc;

use axum::Json;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tempfile::{Builder as TempBuilder, NamedTempFile};
use tokio::io::AsyncWriteExt;

use crate::error::{CmsError, Result};
use crate::http::{AppState, FileQuery};
use crate::media::{MediaAsset, sniff};
use crate::mirror::PageMirror;
use crate::storage::{ContentStore, leaf_name};
use crate::upload::{StagedFile, TransportError, UploadLimits, UploadedFile};

const IMMUTABLE: &str = "public, max-age=31536000, immutable";

#[derive(Serialize)]
pub(crate) struct MediaListBody {
    status: &'static str,
    media: Vec<MediaAsset>,
}

#[derive(Serialize)]
pub(crate) struct UploadBody {
    status: &'static str,
    message: &'static str,
    media: MediaAsset,
}

pub(crate) async fn list_media<S: ContentStore, M: PageMirror>(
    method: Method,
    State(state): State<Arc<AppState<S, M>>>,
) -> Result<Json<MediaListBody>> {
    if method != Method::GET {
        return Err(CmsError::MethodNotAllowed(
            "Invalid request method. Use GET to fetch media list.",
        ));
    }

    let objects = state
        .uploads
        .list()
        .await
        .map_err(|e| CmsError::storage("Unable to read media library.", e))?;

    let media = objects
        .into_iter()
        .filter(|o| o.mime.starts_with("image/"))
        .map(MediaAsset::from_stored)
        .collect();

    Ok(Json(MediaListBody {
        status: "success",
        media,
    }))
}

pub(crate) async fn serve_media<S: ContentStore, M: PageMirror>(
    State(state): State<Arc<AppState<S, M>>>,
    Query(query): Query<FileQuery>,
) -> Response {
    let Some(name) = query.file.as_deref().and_then(leaf_name) else {
        return (StatusCode::BAD_REQUEST, "Missing file parameter.").into_response();
    };

    match state.uploads.get(name).await {
        Ok(Some(bytes)) => {
            let mime = sniff::sniff(&bytes);
            (
                [
                    (header::CONTENT_TYPE, mime.to_string()),
                    (header::CONTENT_LENGTH, bytes.len().to_string()),
                    (header::CACHE_CONTROL, IMMUTABLE.to_string()),
                ],
                bytes,
            )
                .into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, "File not found.").into_response(),
        Err(e) => {
            tracing::error!("Failed to read media {name}: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Unable to read file.").into_response()
        }
    }
}

pub(crate) async fn upload_media<S: ContentStore, M: PageMirror>(
    State(state): State<Arc<AppState<S, M>>>,
    request: Request,
) -> Result<Response> {
    if request.method() != Method::POST {
        return Err(CmsError::MethodNotAllowed(
            "Invalid request method. Use POST to upload media.",
        ));
    }

    let no_payload = || CmsError::BadRequest("No file payload received.".into());
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|_| no_payload())?;

    let file = receive_file_field(&mut multipart, state.upload.limits())
        .await
        .ok_or_else(no_payload)?;

    let media = state.upload.accept(file).await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadBody {
            status: "success",
            message: "File uploaded successfully.",
            media,
        }),
    )
        .into_response())
}

/// Find the `file` field and stage it. `None` when the form has no such
/// field.
async fn receive_file_field(
    multipart: &mut Multipart,
    limits: &UploadLimits,
) -> Option<UploadedFile> {
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                return Some(stage_field(field, limits).await);
            }
            Ok(Some(_)) => continue,
            Ok(None) => return None,
            Err(e) => return Some(UploadedFile::failed("", transport_error(&e))),
        }
    }
}

fn transport_error(err: &MultipartError) -> TransportError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        TransportError::ExceedsTransportLimit
    } else {
        TransportError::Partial
    }
}

/// Spool one field to a temporary file, counting bytes as they arrive.
///
/// Writing stops once the count passes the size limit; the rest of the
/// field is drained so the declared size covers the whole transfer.
async fn stage_field(mut field: Field<'_>, limits: &UploadLimits) -> UploadedFile {
    let original_name = field.file_name().unwrap_or_default().to_string();
    if original_name.is_empty() {
        return UploadedFile::failed(original_name, TransportError::NoFile);
    }
    if limits.is_blocked(&original_name) {
        tracing::debug!("Blocked upload {original_name:?} by extension");
        return UploadedFile::failed(original_name, TransportError::Blocked);
    }

    let temp = match staging_file(limits) {
        Ok(temp) => temp,
        Err(e) => {
            tracing::error!("Cannot create staging file: {e}");
            return UploadedFile::failed(original_name, TransportError::NoTempDir);
        }
    };
    let (file, path) = temp.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut declared_size: u64 = 0;
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => return UploadedFile::failed(original_name, transport_error(&e)),
        };
        declared_size += chunk.len() as u64;
        if declared_size > limits.max_size {
            continue;
        }
        if let Err(e) = file.write_all(&chunk).await {
            tracing::error!("Cannot write staging file: {e}");
            return UploadedFile::failed(original_name, TransportError::CantWrite);
        }
    }
    if let Err(e) = file.flush().await {
        tracing::error!("Cannot flush staging file: {e}");
        return UploadedFile::failed(original_name, TransportError::CantWrite);
    }

    UploadedFile {
        original_name,
        declared_size,
        staged: Ok(StagedFile::OnDisk(path)),
    }
}

fn staging_file(limits: &UploadLimits) -> std::io::Result<NamedTempFile> {
    let mut builder = TempBuilder::new();
    builder.prefix("upload-");
    match &limits.staging_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
}
