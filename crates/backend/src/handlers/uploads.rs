use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use contracts::usecases::u502_csv_upload::UploadAccepted;

use crate::shared::app_state::AppState;
use crate::usecases::u502_csv_upload::UploadError;

/// POST /api/tenants/:tenant_id/uploads/:platform (multipart field `file`)
pub async fn upload_csv(
    State(state): State<AppState>,
    Path((tenant_id, platform)): Path<(String, String)>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadAccepted>), StatusCode> {
    let mut file: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("Bad multipart upload: {}", e);
        StatusCode::BAD_REQUEST
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(|s| s.to_string());
        let bytes = field.bytes().await.map_err(|e| {
            tracing::warn!("Failed to read upload body: {}", e);
            StatusCode::PAYLOAD_TOO_LARGE
        })?;
        file = Some((file_name, bytes.to_vec()));
        break;
    }

    let (file_name, bytes) = file.ok_or(StatusCode::BAD_REQUEST)?;
    match state
        .uploads
        .accept(&tenant_id, &platform, file_name.as_deref(), &bytes)
        .await
    {
        Ok(accepted) => Ok((StatusCode::ACCEPTED, Json(accepted))),
        Err(UploadError::TooLarge { size, limit }) => {
            tracing::warn!("Upload rejected: {} bytes over the {} limit", size, limit);
            Err(StatusCode::PAYLOAD_TOO_LARGE)
        }
        Err(UploadError::Storage(e)) => {
            tracing::error!("Failed to store upload: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(e) => {
            tracing::warn!("Upload rejected: {}", e);
            Err(StatusCode::BAD_REQUEST)
        }
    }
}
