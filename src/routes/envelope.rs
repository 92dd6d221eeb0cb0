use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

/// Response envelope shared by every endpoint
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    /// `"true"` or `"false"` (a string, for compatibility with existing clients)
    pub success: &'static str,
    pub message: String,
    pub data: T,
}

/// Successful response carrying `data`
pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: "true",
        message: String::new(),
        data,
    })
}

/// Successful response with a message and empty data
pub fn ok_message(message: impl Into<String>) -> Json<Envelope<Value>> {
    Json(Envelope {
        success: "true",
        message: message.into(),
        data: json!({}),
    })
}
