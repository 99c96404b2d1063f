use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::orders::{
        CancelItemRequest, CreateOrderForm, CreateOrderRequest, OrderLineRequest, OrderList,
        OrderWithItems, UpdateStatusRequest,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::form::FormData,
    services::order_service,
    state::AppState,
};

pub fn route() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/user/{id}", get(buyer_orders))
        .route("/seller/{id}", get(seller_orders))
        .route("/{id}", get(get_order))
        .route("/{id}/status", put(update_status))
        .route("/{id}/cancel/{item_id}", put(cancel_item))
}

#[utoipa::path(
    post,
    path = "/api/orders",
    request_body(content = CreateOrderForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Order created", body = ApiResponse<OrderWithItems>),
        (status = 400, description = "Invalid items or insufficient stock"),
        (status = 404, description = "Product not found"),
        (status = 502, description = "Receipt upload failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let mut form = FormData::from_multipart(multipart).await?;
    let items: Vec<OrderLineRequest> = form
        .json("items")?
        .ok_or_else(|| AppError::BadRequest("items is required".into()))?;
    let payload = CreateOrderRequest {
        phone_number: form.required("phone_number")?,
        selected_bank: form.required("selected_bank")?,
        address: form.required("address")?,
        items,
    };
    let receipt = form.take_file(&["receipt", "receipt_image", "file"]);

    let resp = order_service::create_order(&state, &user, payload, receipt).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/orders/user/{id}",
    params(
        ("id" = Uuid, Path, description = "Buyer user ID")
    ),
    responses(
        (status = 200, description = "Orders placed by the buyer", body = ApiResponse<OrderList>),
        (status = 403, description = "Not the buyer or an admin")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn buyer_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::get_buyer_orders(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/orders/seller/{id}",
    params(
        ("id" = Uuid, Path, description = "Seller user ID")
    ),
    responses(
        (status = 200, description = "Orders with the seller's items only", body = ApiResponse<OrderList>),
        (status = 403, description = "Not the seller or an admin")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn seller_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::get_seller_orders(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Order with the items visible to the caller", body = ApiResponse<OrderWithItems>),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::get_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/orders/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderWithItems>),
        (status = 400, description = "Unknown status"),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Order or item not found"),
        (status = 409, description = "Item already delivered or cancelled")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::update_status(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/orders/{id}/cancel/{item_id}",
    params(
        ("id" = Uuid, Path, description = "Order ID"),
        ("item_id" = Uuid, Path, description = "Order item ID")
    ),
    request_body = CancelItemRequest,
    responses(
        (status = 200, description = "Item cancelled", body = ApiResponse<OrderWithItems>),
        (status = 409, description = "Item already delivered")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn cancel_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    payload: Option<Json<CancelItemRequest>>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let resp = order_service::cancel_item(&state, &user, id, item_id, payload).await?;
    Ok(Json(resp))
}
