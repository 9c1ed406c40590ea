//! HTTP surface: axum handlers mounted at the legacy script paths.

mod media;
mod pages;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get};
use serde::Deserialize;

use crate::mirror::PageMirror;
use crate::snapshot::SnapshotService;
use crate::storage::ContentStore;
use crate::upload::UploadPipeline;

pub const MEDIA_LIST_PATH: &str = "/media-list.php";
pub const MEDIA_PATH: &str = "/media.php";
pub const PREVIEW_PATH: &str = "/preview.php";
pub const SAVE_PATH: &str = "/save-html.php";
pub const UPLOAD_PATH: &str = "/upload-media.php";

/// Shared, read-only state handed to every handler.
pub struct AppState<S: ContentStore, M: PageMirror> {
    pub uploads: Arc<S>,
    pub snapshots: Arc<S>,
    pub upload: UploadPipeline<S>,
    pub snapshot: SnapshotService<S, M>,
}

/// `?file=` query parameter used by the serve and preview endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct FileQuery {
    file: Option<String>,
}

/// Build the router. `transport_limit` caps the upload request body.
pub fn router<S: ContentStore, M: PageMirror>(
    state: AppState<S, M>,
    transport_limit: usize,
) -> Router {
    Router::new()
        .route(MEDIA_LIST_PATH, any(media::list_media::<S, M>))
        .route(MEDIA_PATH, get(media::serve_media::<S, M>))
        .route(
            UPLOAD_PATH,
            any(media::upload_media::<S, M>).layer(DefaultBodyLimit::max(transport_limit)),
        )
        .route(PREVIEW_PATH, get(pages::preview::<S, M>))
        .route(SAVE_PATH, any(pages::save_html::<S, M>))
        .with_state(Arc::new(state))
}
