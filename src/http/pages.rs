//! Page endpoints: save a snapshot and preview it.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Form, FromRequest, Multipart, Query, Request, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};

use crate::error::CmsError;
use crate::http::{AppState, FileQuery};
use crate::mirror::PageMirror;
use crate::snapshot::{PageSnapshot, SaveRequest, SaveStatus};
use crate::storage::{ContentStore, leaf_name};

const NOT_FOUND_HTML: &str = "<h2>File not found.</h2>";

pub(crate) async fn preview<S: ContentStore, M: PageMirror>(
    State(state): State<Arc<AppState<S, M>>>,
    Query(query): Query<FileQuery>,
) -> Response {
    let Some(name) = query.file.as_deref().and_then(leaf_name) else {
        return (StatusCode::BAD_REQUEST, Html(NOT_FOUND_HTML)).into_response();
    };

    match state.snapshots.get(name).await {
        Ok(Some(bytes)) => Html(bytes).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Html(NOT_FOUND_HTML)).into_response(),
        Err(e) => {
            tracing::error!("Failed to read snapshot {name}: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Html(NOT_FOUND_HTML)).into_response()
        }
    }
}

pub(crate) async fn save_html<S: ContentStore, M: PageMirror>(
    State(state): State<Arc<AppState<S, M>>>,
    request: Request,
) -> Result<Response, CmsError> {
    if request.method() != Method::POST {
        return Err(CmsError::MethodNotAllowed(
            "Invalid request method. Use POST to submit editor content.",
        ));
    }

    let form = read_save_form(request).await?;
    let snapshot = PageSnapshot::from_request(form)?;
    let report = state.snapshot.save(snapshot).await;

    let status = match report.status {
        SaveStatus::Error => StatusCode::INTERNAL_SERVER_ERROR,
        SaveStatus::Success | SaveStatus::Partial => StatusCode::OK,
    };
    Ok((status, Json(report)).into_response())
}

/// Editors post either url-encoded or multipart forms.
async fn read_save_form(request: Request) -> Result<SaveRequest, CmsError> {
    let invalid = || CmsError::BadRequest("Invalid form submission.".into());

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase);

    // Bodies that are not forms carry no fields; save an empty default page.
    let Some(content_type) = content_type else {
        return Ok(SaveRequest::default());
    };
    if !content_type.starts_with("multipart/form-data")
        && !content_type.starts_with("application/x-www-form-urlencoded")
    {
        tracing::debug!("Ignoring non-form save body ({content_type})");
        return Ok(SaveRequest::default());
    }

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(form) = Form::<SaveRequest>::from_request(request, &())
            .await
            .map_err(|e| {
                tracing::debug!("Rejected save form: {e}");
                invalid()
            })?;
        return Ok(form);
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|_| invalid())?;
    let mut form = SaveRequest::default();
    while let Some(field) = multipart.next_field().await.map_err(|_| invalid())? {
        let slot = match field.name() {
            Some("filename") => &mut form.filename,
            Some("title") => &mut form.title,
            Some("slug") => &mut form.slug,
            Some("htmlContent") => &mut form.html_content,
            _ => continue,
        };
        *slot = Some(field.text().await.map_err(|_| invalid())?);
    }
    Ok(form)
}
