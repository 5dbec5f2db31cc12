use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use tracing::{error, info};

use rivalroll_core::catalog::MAX_UPLOAD_BYTES;
use rivalroll_core::icons::{sniff_image_mime, to_data_url};
use rivalroll_core::{CatalogError, CustomIconMap, ImageCatalog, PlayerId};
use rivalroll_shared::{
    ActionResponse, ApiError, CatalogResponse, DefaultResponse, ErrorBody, RosterResponse,
    SessionView, SetDefaultRequest, SetDefaultResponse, UploadResponse,
};

use crate::service::SessionService;

pub struct AppState {
    pub session: Arc<SessionService>,
    pub catalog: ImageCatalog,
    pub api_key: String,
}

type Rejection = (StatusCode, Json<ErrorBody>);
type ApiJson<T> = Result<Json<T>, Rejection>;
type AdminAuth = Option<TypedHeader<Authorization<Bearer>>>;

fn reject(err: ApiError) -> Rejection {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.body()))
}

fn catalog_error(err: CatalogError) -> ApiError {
    match err {
        CatalogError::InvalidType | CatalogError::TooLarge { .. } | CatalogError::EmptyName => {
            ApiError::Invalid(err.to_string())
        }
        CatalogError::AlreadyExists(_) => ApiError::Conflict(err.to_string()),
        CatalogError::Io(_) | CatalogError::Json(_) => {
            error!(error = %err, "catalog operation failed");
            ApiError::Internal
        }
    }
}

fn authorize(state: &AppState, auth: AdminAuth) -> Result<(), Rejection> {
    match auth {
        Some(TypedHeader(Authorization(bearer))) if bearer.token() == state.api_key => Ok(()),
        _ => Err(reject(ApiError::Unauthorized)),
    }
}

fn parse_player(raw: &str) -> Result<PlayerId, Rejection> {
    raw.parse()
        .map_err(|err: rivalroll_core::SessionError| reject(ApiError::Invalid(err.to_string())))
}

/// Runs filesystem catalog work off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, Rejection>
where
    F: FnOnce() -> Result<T, CatalogError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| {
            error!(error = %err, "catalog task panicked");
            reject(ApiError::Internal)
        })?
        .map_err(|err| reject(catalog_error(err)))
}

struct UploadedFile {
    file_name: String,
    content_type: Option<String>,
    bytes: Bytes,
}

async fn read_file_field(mut multipart: Multipart) -> Result<UploadedFile, Rejection> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| reject(ApiError::Invalid(err.to_string())))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|err| reject(ApiError::Invalid(err.to_string())))?;
        return Ok(UploadedFile {
            file_name,
            content_type,
            bytes,
        });
    }
    Err(reject(ApiError::Invalid("no file provided".into())))
}

async fn route_roster(State(state): State<Arc<AppState>>) -> Json<RosterResponse> {
    let roster = state.session.roster().await;
    Json(RosterResponse {
        characters: roster.characters().iter().map(|c| c.name.clone()).collect(),
    })
}

async fn route_session(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(state.session.snapshot().await)
}

async fn route_spin(
    State(state): State<Arc<AppState>>,
    Path(player): Path<String>,
) -> ApiJson<ActionResponse> {
    let player = parse_player(&player)?;
    Ok(Json(state.session.spin(player).await))
}

async fn route_spin_both(State(state): State<Arc<AppState>>) -> Json<ActionResponse> {
    Json(state.session.spin_both().await)
}

async fn route_skip(
    State(state): State<Arc<AppState>>,
    Path(player): Path<String>,
) -> ApiJson<ActionResponse> {
    let player = parse_player(&player)?;
    Ok(Json(state.session.skip(player).await))
}

async fn route_purge(State(state): State<Arc<AppState>>) -> Json<ActionResponse> {
    Json(state.session.purge().await)
}

async fn route_icons(State(state): State<Arc<AppState>>) -> Json<CustomIconMap> {
    Json(state.session.icons().await)
}

async fn route_icon_upload(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    multipart: Multipart,
) -> ApiJson<SessionView> {
    let file = read_file_field(multipart).await?;
    if file.bytes.is_empty() || file.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(reject(ApiError::Invalid("could not process image".into())));
    }
    let mime = file
        .content_type
        .as_deref()
        .filter(|ct| ct.starts_with("image/"))
        .or_else(|| sniff_image_mime(&file.bytes))
        .ok_or_else(|| reject(ApiError::Invalid("could not process image".into())))?
        .to_string();
    let view = state
        .session
        .set_icon(&name, to_data_url(&mime, &file.bytes))
        .await
        .map_err(reject)?;
    Ok(Json(view))
}

async fn route_icon_remove(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiJson<SessionView> {
    state.session.remove_icon(&name).await.map(Json).map_err(reject)
}

async fn route_catalog_list(State(state): State<Arc<AppState>>) -> ApiJson<CatalogResponse> {
    let catalog = state.catalog.clone();
    let config = blocking(move || catalog.sync()).await?;
    Ok(Json(CatalogResponse {
        success: true,
        message: None,
        characters: config.characters.into_values().collect(),
        default_character: config.default_character,
    }))
}

async fn route_catalog_sync(State(state): State<Arc<AppState>>) -> ApiJson<CatalogResponse> {
    info!("manual catalog sync triggered");
    let catalog = state.catalog.clone();
    let config = blocking(move || catalog.sync()).await?;
    let count = config.characters.len();
    Ok(Json(CatalogResponse {
        success: true,
        message: Some(format!("Successfully synced {count} character image(s)")),
        characters: config.characters.into_values().collect(),
        default_character: config.default_character,
    }))
}

async fn route_catalog_upload(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    multipart: Multipart,
) -> ApiJson<UploadResponse> {
    authorize(&state, auth)?;
    let file = read_file_field(multipart).await?;
    let catalog = state.catalog.clone();
    let character = blocking(move || catalog.store_upload(&file.file_name, &file.bytes)).await?;
    Ok(Json(UploadResponse {
        success: true,
        message: "Character image uploaded successfully".into(),
        is_default: character.as_ref().is_some_and(|c| c.is_default),
        character,
    }))
}

async fn route_default_get(State(state): State<Arc<AppState>>) -> ApiJson<DefaultResponse> {
    let catalog = state.catalog.clone();
    let default_character = blocking(move || Ok(catalog.default_character())).await?;
    Ok(Json(DefaultResponse { default_character }))
}

async fn route_default_set(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(req): Json<SetDefaultRequest>,
) -> ApiJson<SetDefaultResponse> {
    authorize(&state, auth)?;
    let id = req
        .character_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| reject(ApiError::Invalid("character id is required".into())))?;
    let catalog = state.catalog.clone();
    let lookup = id.clone();
    if !blocking(move || catalog.set_default(&lookup)).await? {
        return Err(reject(ApiError::NotFound(format!("character {id}"))));
    }
    info!(%id, "default character updated");
    Ok(Json(SetDefaultResponse {
        success: true,
        message: "Default character updated successfully".into(),
        default_character: id,
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/roster", get(route_roster))
        .route("/session", get(route_session))
        .route("/session/spin/:player", post(route_spin))
        .route("/session/spin-both", post(route_spin_both))
        .route("/session/skip/:player", post(route_skip))
        .route("/session/purge", post(route_purge))
        .route("/icons", get(route_icons))
        .route(
            "/icons/:name",
            post(route_icon_upload).delete(route_icon_remove),
        )
        .route(
            "/characters/upload",
            get(route_catalog_list).post(route_catalog_upload),
        )
        .route(
            "/characters/sync",
            get(route_catalog_sync).post(route_catalog_sync),
        )
        .route(
            "/characters/default",
            get(route_default_get).post(route_default_set),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 1024 * 1024))
        .with_state(state)
}
