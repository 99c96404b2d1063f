use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Message, PartnerSummary};

/// Direct message fields parsed from the multipart form.
#[derive(Debug, Clone, Default)]
pub struct SendMessageRequest {
    pub receiver_id: Option<Uuid>,
    pub body: Option<String>,
    pub is_image: bool,
    pub caption: Option<String>,
    pub reply_to: Option<Uuid>,
}

/// Buyer and seller message fields parsed from the multipart form.
#[derive(Debug, Clone, Default)]
pub struct ProductSendMessageRequest {
    pub seller_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub body: Option<String>,
    pub is_image: bool,
    pub caption: Option<String>,
    pub reply_to: Option<Uuid>,
}

/// Multipart body of `POST /api/messages/send-message`.
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct SendMessageForm {
    pub receiver_id: Uuid,
    pub message: Option<String>,
    pub is_image: Option<bool>,
    pub caption: Option<String>,
    pub reply_to: Option<Uuid>,
    #[schema(value_type = Option<String>, format = Binary)]
    pub file: Option<Vec<u8>>,
}

/// Multipart body of `POST /api/product-messages/send-message`.
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct ProductSendMessageForm {
    pub seller_id: Uuid,
    pub user_id: Uuid,
    pub message: Option<String>,
    pub is_image: Option<bool>,
    pub caption: Option<String>,
    pub reply_to: Option<Uuid>,
    #[schema(value_type = Option<String>, format = Binary)]
    pub file: Option<Vec<u8>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GetMessagesRequest {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct MessageList {
    #[schema(value_type = Vec<Message>)]
    pub items: Vec<Message>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct PartnerList {
    #[schema(value_type = Vec<PartnerSummary>)]
    pub items: Vec<PartnerSummary>,
}
