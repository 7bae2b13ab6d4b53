use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

/// Turns a named view plus its data into a response body.
///
/// The service only ever supplies data; presentation lives behind this trait.
pub trait ViewRenderer: Send + Sync {
    fn render(&self, view: &str, data: Value) -> Response;
}

/// Emits `{"view": ..., "data": ...}` for API clients and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl ViewRenderer for JsonRenderer {
    fn render(&self, view: &str, data: Value) -> Response {
        Json(json!({ "view": view, "data": data })).into_response()
    }
}
