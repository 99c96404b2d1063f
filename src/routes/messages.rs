use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::messages::{
        GetMessagesRequest, MessageList, PartnerList, ProductSendMessageForm,
        ProductSendMessageRequest, SendMessageForm, SendMessageRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::{ConversationKind, Message},
    response::ApiResponse,
    routes::form::FormData,
    services::message_service,
    state::AppState,
};

const FILE_FIELDS: &[&str] = &["file", "image"];

/// User to user chat.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/send-message", post(send_message))
        .route("/get-messages", post(get_messages))
        .route("/conversation-partners/{user_id}", get(conversation_partners))
        .route("/{id}/read", put(mark_read))
}

/// Buyer and seller chat about listings.
pub fn product_router() -> Router<AppState> {
    Router::new()
        .route("/send-message", post(send_product_message))
        .route("/partners/{user_id}", get(product_partners))
        .route("/{seller_id}/{user_id}", get(get_product_messages))
}

#[utoipa::path(
    post,
    path = "/api/messages/send-message",
    request_body(content = SendMessageForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Message sent", body = ApiResponse<Message>),
        (status = 400, description = "Empty message or self message"),
        (status = 404, description = "Receiver or reply target not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Messages"
)]
pub async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<Message>>> {
    let mut form = FormData::from_multipart(multipart).await?;
    let payload = SendMessageRequest {
        receiver_id: form.parse("receiver_id")?,
        body: form.text("message"),
        is_image: form.flag("is_image")?,
        caption: form.text("caption"),
        reply_to: form.parse("reply_to")?,
    };
    let file = form.take_file(FILE_FIELDS);

    let resp = message_service::send_direct(&state, &user, payload, file).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/messages/get-messages",
    request_body = GetMessagesRequest,
    responses(
        (status = 200, description = "Messages between two users, oldest first", body = ApiResponse<MessageList>),
        (status = 403, description = "Caller is not a participant")
    ),
    security(("bearer_auth" = [])),
    tag = "Messages"
)]
pub async fn get_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<GetMessagesRequest>,
) -> AppResult<Json<ApiResponse<MessageList>>> {
    let resp = message_service::get_direct_messages(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/messages/conversation-partners/{user_id}",
    params(
        ("user_id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Chat partners, most recent first", body = ApiResponse<PartnerList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Messages"
)]
pub async fn conversation_partners(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PartnerList>>> {
    let resp =
        message_service::list_partners(&state, &user, ConversationKind::Direct, user_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/messages/{id}/read",
    params(
        ("id" = Uuid, Path, description = "Message ID")
    ),
    responses(
        (status = 200, description = "Message marked as read", body = ApiResponse<Message>),
        (status = 403, description = "Caller is not the receiver"),
        (status = 404, description = "Message not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Messages"
)]
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Message>>> {
    let resp = message_service::mark_read(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/product-messages/send-message",
    request_body(content = ProductSendMessageForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Message sent", body = ApiResponse<Message>),
        (status = 403, description = "Caller is neither the seller nor the user")
    ),
    security(("bearer_auth" = [])),
    tag = "Product messages"
)]
pub async fn send_product_message(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<Message>>> {
    let mut form = FormData::from_multipart(multipart).await?;
    let payload = ProductSendMessageRequest {
        seller_id: form.parse("seller_id")?,
        user_id: form.parse("user_id")?,
        body: form.text("message"),
        is_image: form.flag("is_image")?,
        caption: form.text("caption"),
        reply_to: form.parse("reply_to")?,
    };
    let file = form.take_file(FILE_FIELDS);

    let resp = message_service::send_product(&state, &user, payload, file).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/product-messages/{seller_id}/{user_id}",
    params(
        ("seller_id" = Uuid, Path, description = "Seller ID"),
        ("user_id" = Uuid, Path, description = "Buyer ID")
    ),
    responses(
        (status = 200, description = "Messages between seller and buyer, oldest first", body = ApiResponse<MessageList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Product messages"
)]
pub async fn get_product_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path((seller_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<MessageList>>> {
    let resp = message_service::get_product_messages(&state, &user, seller_id, user_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/product-messages/partners/{user_id}",
    params(
        ("user_id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Chat partners, most recent first", body = ApiResponse<PartnerList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Product messages"
)]
pub async fn product_partners(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PartnerList>>> {
    let resp =
        message_service::list_partners(&state, &user, ConversationKind::Product, user_id).await?;
    Ok(Json(resp))
}
