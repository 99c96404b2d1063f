use axum::{Json, Router, extract::State, routing::get};

use crate::{
    error::AppResult,
    middleware::auth::AuthUser,
    models::Account,
    response::ApiResponse,
    services::account_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/me", get(my_account))
}

#[utoipa::path(
    get,
    path = "/api/accounts/me",
    responses(
        (status = 200, description = "Seller balance and payment history", body = ApiResponse<Account>),
        (status = 404, description = "No sale has been credited yet")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn my_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Account>>> {
    let resp = account_service::get_account(&state, &user, user.user_id).await?;
    Ok(Json(resp))
}
