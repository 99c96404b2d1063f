use axum::{
    Json, Router,
    extract::{Multipart, State},
    routing::get,
};

use crate::{
    dto::auth::{UpdateProfileForm, UpdateProfileRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::User,
    response::ApiResponse,
    routes::form::FormData,
    services::auth_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/me", get(get_me).put(update_me))
}

#[utoipa::path(
    get,
    path = "/api/users/me",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<User>),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = auth_service::me(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/users/me",
    request_body(content = UpdateProfileForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Profile updated", body = ApiResponse<User>),
        (status = 502, description = "Image host failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<User>>> {
    let mut form = FormData::from_multipart(multipart).await?;
    let payload = UpdateProfileRequest {
        name: form.text("name"),
        bio: form.text("bio"),
        university: form.text("university"),
    };
    let image = form.take_file(&["image", "file"]);

    let resp = auth_service::update_profile(&state, &user, payload, image).await?;
    Ok(Json(resp))
}
