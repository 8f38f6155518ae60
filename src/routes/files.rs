//! Upload and download endpoints
//!
//! - `POST /upload` - store the multipart `file` field and answer with a share URL
//! - `GET /file/{key}` - stream a stored object back as an attachment

use std::io;

use axum::{
    body::Body,
    extract::{
        multipart::MultipartError, rejection::PathRejection, DefaultBodyLimit, Multipart, Path,
        State,
    },
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use s3::error::S3Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::not_found;
use crate::config::ServerConfig;
use crate::models::{AppState, UploadResponse};
use crate::storage::{PutOptions, StorageError};
use crate::types::{AppError, AppResult};
use crate::utils::{content_disposition, sanitize_filename, FALLBACK_FILENAME};

/// Multipart field carrying the upload.
pub const FILE_FIELD: &str = "file";
/// Path prefix of share URLs.
pub const FILE_ROUTE_PREFIX: &str = "/file/";

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.upload.max_file_size;

    Router::new()
        .route("/upload", post(upload_file).fallback(not_found))
        .route("/file/{*key}", get(download_file).fallback(not_found))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            debug!(field = ?field.name(), "Skipping form field");
            continue;
        }

        let filename = sanitize_filename(field.file_name().unwrap_or_default());
        let content_type = declared_content_type(field.content_type())
            .or_else(|| guess_content_type(&filename));
        let key = object_key(&filename);
        let expire_at = Utc::now() + state.config.upload.ttl();

        info!(
            %key,
            content_type = ?content_type,
            %expire_at,
            store = state.store.name(),
            "Storing upload"
        );

        let options = PutOptions {
            expire_at,
            content_type,
            original_filename: filename,
        };
        let body = field.map_err(io::Error::other).boxed();
        state
            .store
            .put(&key, body, options)
            .await
            .map_err(upload_failure)?;

        let origin = request_origin(&state.config.server, &headers);
        let url = share_url(&origin, &key);
        info!(%key, %url, "Upload stored");

        return Ok(Json(UploadResponse { success: true, url }));
    }

    Err(AppError::MissingFile)
}

async fn download_file(
    State(state): State<AppState>,
    key: Result<Path<String>, PathRejection>,
) -> AppResult<Response> {
    // A key that does not decode to UTF-8 cannot name a stored object.
    let Path(key) = key.map_err(|rejection| {
        debug!(error = %rejection, "Rejected download path");
        AppError::FileNotFound(rejection.body_text())
    })?;
    let object = state
        .store
        .get(&key)
        .await?
        .ok_or_else(|| AppError::FileNotFound(key.clone()))?;

    let filename = object
        .original_filename
        .clone()
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string());
    debug!(%key, %filename, size = ?object.size, "Streaming download");

    let mut headers = HeaderMap::new();
    if let Some(value) = object
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(size) = object.size {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }
    let disposition = HeaderValue::from_str(&content_disposition(&filename))
        .map_err(|e| AppError::Internal(format!("invalid Content-Disposition for {}: {}", key, e)))?;
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

    Ok((headers, Body::from_stream(object.body)).into_response())
}

/// Globally unique key: random identifier plus the original filename.
fn object_key(filename: &str) -> String {
    format!("{}/{}", Uuid::new_v4(), filename)
}

/// Share URL for `key`, each segment percent-encoded.
fn share_url(origin: &str, key: &str) -> String {
    let path = key
        .split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/");
    format!("{}{}{}", origin, FILE_ROUTE_PREFIX, path)
}

/// Origin for share URLs: `PUBLIC_URL` when configured, else the `Host` of
/// the request. `X-Forwarded-*` headers only count when the deployment says
/// its proxy sets them.
fn request_origin(server: &ServerConfig, headers: &HeaderMap) -> String {
    if let Some(public_url) = &server.public_url {
        return public_url.clone();
    }

    let forwarded = |name: &str| {
        if server.trust_forwarded_headers {
            header_value(headers, name)
        } else {
            None
        }
    };
    let host = forwarded("x-forwarded-host")
        .or_else(|| header_value(headers, header::HOST.as_str()))
        .unwrap_or("localhost");
    let scheme = forwarded("x-forwarded-proto").unwrap_or("http");
    format!("{}://{}", scheme, host)
}

/// First comma-separated entry of a header, if present and non-empty.
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn declared_content_type(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

fn guess_content_type(filename: &str) -> Option<String> {
    mime_guess::from_path(filename).first().map(|mime| mime.to_string())
}

// Client-side body failures (truncated or oversized uploads) reach us through
// the store as I/O errors, possibly wrapped by the S3 client. Recover them so
// the client gets a 4xx.
fn upload_failure(err: StorageError) -> AppError {
    match err {
        StorageError::Io(io_err) => match multipart_cause(io_err) {
            Ok(multipart) => AppError::Multipart(multipart),
            Err(io_err) => AppError::Storage(StorageError::Io(io_err)),
        },
        StorageError::S3(S3Error::Io(io_err)) => match multipart_cause(io_err) {
            Ok(multipart) => AppError::Multipart(multipart),
            Err(io_err) => AppError::Storage(StorageError::S3(S3Error::Io(io_err))),
        },
        other => AppError::Storage(other),
    }
}

fn multipart_cause(err: io::Error) -> Result<MultipartError, io::Error> {
    let from_body = err
        .get_ref()
        .is_some_and(|inner| inner.is::<MultipartError>());
    if !from_body {
        return Err(err);
    }
    match err.into_inner().map(|inner| inner.downcast::<MultipartError>()) {
        Some(Ok(multipart)) => Ok(*multipart),
        Some(Err(inner)) => Err(io::Error::other(inner)),
        None => Err(io::Error::other("upload body stream failed")),
    }
}
