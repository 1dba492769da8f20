//! Request handlers.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};

use campusdrive_common::DriveItem;
use campusdrive_drive::RemoteItem;
use campusdrive_tabular::{Table, TableContent, XLSX_EXTENSION};

use crate::error::{ApiError, ApiResult};
use crate::models::{
    AuthResponse, BackResponse, CreateFileRequest, CreateFolderRequest, EnterRequest,
    FileCreatedResponse, FolderContentsResponse, FolderCreatedResponse, FolderQuery,
    MessageResponse, NavigationResponse, UpdateContentRequest,
};
use crate::state::{AppState, Session};

pub async fn index() -> Json<Value> {
    Json(json!({
        "message": "campusdrive API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "auth": "/auth/login, /auth/status, /auth/logout",
            "folders": "/folders, /folders (POST)",
            "navigate": "/navigate, /navigate/enter (POST), /navigate/back (POST)",
            "files": "/files/excel (POST), /files/upload (POST), /files/{id}/content, /files/{id}/download",
            "items": "/items/{id}, /items/{id} (DELETE)",
            "search": "/search/{name}"
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let sessions = state.session_count().await;
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "authenticated": sessions > 0,
        "sessions": sessions,
    }))
}

pub async fn login(State(state): State<AppState>) -> ApiResult<Json<AuthResponse>> {
    let (id, _navigator) = state.open_session().await?;
    let token = state.client().tokens().get_token(false).await?;

    Ok(Json(AuthResponse {
        status: "success".to_string(),
        message: "Signed in".to_string(),
        session_id: Some(id.to_string()),
        expires_in: Some(token.expires_in),
    }))
}

pub async fn auth_status(session: Session) -> Json<AuthResponse> {
    Json(AuthResponse {
        status: "authenticated".to_string(),
        message: format!("Session active since {}", session.created_at.to_rfc3339()),
        session_id: Some(session.id.to_string()),
        expires_in: None,
    })
}

pub async fn logout(State(state): State<AppState>, session: Session) -> Json<AuthResponse> {
    state.close_session(&session.id).await;
    Json(AuthResponse {
        status: "logged_out".to_string(),
        message: "Session closed".to_string(),
        session_id: None,
        expires_in: None,
    })
}

pub async fn list_folder(
    session: Session,
    Query(query): Query<FolderQuery>,
) -> ApiResult<Json<FolderContentsResponse>> {
    let navigator = session.navigator.lock().await;
    let items = navigator.list(query.folder_id.as_deref()).await?;

    let current = navigator.current_folder_id()?.to_string();
    let (folder_id, path) = match query.folder_id {
        Some(id) if id != current => (id, Vec::new()),
        _ => (current, navigator.current_path()?),
    };

    Ok(Json(FolderContentsResponse::new(folder_id, path, items)))
}

pub async fn create_folder(
    session: Session,
    Json(request): Json<CreateFolderRequest>,
) -> ApiResult<Json<FolderCreatedResponse>> {
    let navigator = session.navigator.lock().await;
    let folder = navigator
        .create_folder(&request.folder_name, request.parent_folder_id.as_deref())
        .await?;

    Ok(Json(FolderCreatedResponse {
        message: "Folder created".to_string(),
        folder_id: folder.id,
        name: folder.name,
    }))
}

pub async fn navigation(session: Session) -> ApiResult<Json<NavigationResponse>> {
    let navigator = session.navigator.lock().await;
    Ok(Json(navigator.cursor()?.into()))
}

pub async fn navigate_enter(
    session: Session,
    Json(request): Json<EnterRequest>,
) -> ApiResult<Json<NavigationResponse>> {
    let mut navigator = session.navigator.lock().await;
    match (request.folder_id, request.name) {
        (Some(id), _) => navigator.enter_by_id(&id).await?,
        (None, Some(name)) => navigator.enter_by_name(&name).await?,
        (None, None) => return Err(ApiError::bad_request("Provide folder_id or name")),
    };
    Ok(Json(navigator.cursor()?.into()))
}

pub async fn navigate_back(session: Session) -> ApiResult<Json<BackResponse>> {
    let mut navigator = session.navigator.lock().await;
    let moved = navigator.go_back()?;
    Ok(Json(BackResponse {
        moved,
        position: navigator.cursor()?.into(),
    }))
}

pub async fn get_item(session: Session, Path(item_id): Path<String>) -> ApiResult<Json<RemoteItem>> {
    let navigator = session.navigator.lock().await;
    Ok(Json(navigator.get_item(&item_id).await?))
}

pub async fn delete_item(
    session: Session,
    Path(item_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let navigator = session.navigator.lock().await;
    navigator.delete_item(&item_id).await?;
    Ok(Json(MessageResponse::new("Item deleted")))
}

pub async fn search(
    session: Session,
    Path(name): Path<String>,
    Query(query): Query<FolderQuery>,
) -> ApiResult<Json<DriveItem>> {
    let navigator = session.navigator.lock().await;
    navigator
        .find(&name, query.folder_id.as_deref())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Item '{}'", name)))
}

pub async fn create_excel(
    session: Session,
    Json(request): Json<CreateFileRequest>,
) -> ApiResult<Json<FileCreatedResponse>> {
    let table = request
        .data
        .as_ref()
        .map(Table::from_json_columns)
        .transpose()?;

    let navigator = session.navigator.lock().await;
    let file = navigator
        .create_file(&request.filename, table.as_ref(), request.folder_id.as_deref())
        .await?;

    Ok(Json(FileCreatedResponse {
        message: "File created".to_string(),
        file_id: file.id,
        name: file.name,
    }))
}

pub async fn upload(
    session: Session,
    mut multipart: Multipart,
) -> ApiResult<Json<FileCreatedResponse>> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut folder_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
                file = Some((filename, bytes.to_vec()));
            }
            Some("folder_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid folder_id: {}", e)))?;
                folder_id = Some(value).filter(|v| !v.trim().is_empty());
            }
            _ => {}
        }
    }

    let (filename, bytes) = file.ok_or_else(|| ApiError::bad_request("Missing 'file' field"))?;
    if !filename.to_lowercase().ends_with(XLSX_EXTENSION) {
        return Err(ApiError::bad_request("Only Excel files (.xlsx) are accepted"));
    }

    let navigator = session.navigator.lock().await;
    let table = navigator.client().codec().decode(&bytes)?;
    debug!(file = %filename, rows = table.height(), "Decoded upload");
    let created = navigator
        .create_file(&filename, Some(&table), folder_id.as_deref())
        .await?;
    info!(file = %created.name, "Upload stored");

    Ok(Json(FileCreatedResponse {
        message: "File uploaded".to_string(),
        file_id: created.id,
        name: created.name,
    }))
}

pub async fn file_content(
    session: Session,
    Path(file_id): Path<String>,
) -> ApiResult<Json<TableContent>> {
    let navigator = session.navigator.lock().await;
    let table = navigator.read_file(&file_id).await?;
    Ok(Json(table.content()))
}

pub async fn update_content(
    session: Session,
    Path(file_id): Path<String>,
    Json(request): Json<UpdateContentRequest>,
) -> ApiResult<Json<Value>> {
    if let Some(body_id) = &request.file_id {
        if *body_id != file_id {
            return Err(ApiError::bad_request("file_id in body does not match the path"));
        }
    }
    let table = Table::from_json_columns(&request.data)?;

    let navigator = session.navigator.lock().await;
    navigator.update_file(&file_id, &table).await?;
    Ok(Json(json!({ "message": "File updated", "file_id": file_id })))
}

/// Name of the CSV export of a spreadsheet called `name`.
fn csv_filename(name: &str) -> String {
    let split = name.len().saturating_sub(XLSX_EXTENSION.len());
    let stem = match name.get(split..) {
        Some(extension) if extension.eq_ignore_ascii_case(XLSX_EXTENSION) => &name[..split],
        _ => name,
    };
    format!("{}.csv", stem)
}

pub async fn download(
    session: Session,
    Path(file_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let navigator = session.navigator.lock().await;
    let table = navigator.read_file(&file_id).await?;
    let item = navigator.get_item(&file_id).await?;
    let csv = table.to_csv()?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        csv_filename(&item.name).replace('"', "")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}
