//! Upload Handler
//!
//! `POST /upload`: multipart form with a `file` part and an optional
//! `table_name` part.

use std::sync::Arc;

use axum::{
    extract::Multipart,
    http::{header, HeaderMap},
    response::IntoResponse,
    Extension, Json,
};

use super::{session_cookie, session_token};
use crate::orchestrator::Orchestrator;
use crate::protocol::rest::dto::ApiResponse;
use crate::protocol::rest::error::RestError;

pub async fn upload(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, RestError> {
    let mut file: Option<(Option<String>, Vec<u8>)> = None;
    let mut table_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                file = Some((file_name, bytes.to_vec()));
            }
            "table_name" => table_name = Some(field.text().await?),
            _ => {}
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| RestError::bad_request("Missing multipart field 'file'"))?;

    let token = session_token(&headers);
    let summary = orchestrator
        .upload(token.as_deref(), file_name, table_name.as_deref(), bytes)
        .await?;

    let cookie = session_cookie(&summary.session_id)?;
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(ApiResponse::success(summary)),
    ))
}
