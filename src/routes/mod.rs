//! HTTP Routes
//!
//! - `GET /` - upload page
//! - `POST /upload` - store a file, answer with a share URL
//! - `GET /file/{key}` - stream a stored file back as an attachment
//!
//! Every other path or method answers 404. A panic anywhere below the router
//! becomes a generic 500.

pub mod files;
pub mod ui;

use std::any::Any;

use axum::{response::Response, Router};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::models::AppState;
use crate::types::{internal_error_response, AppError};

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    Router::new()
        .merge(ui::router(state.clone()))
        .merge(files::router(state))
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
}

pub(crate) async fn not_found() -> AppError {
    AppError::NotFound
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else {
        "non-string panic payload"
    };
    error!(panic = detail, "Request handler panicked");
    internal_error_response()
}
