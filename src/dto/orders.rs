use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Order, OrderItem};

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub phone_number: String,
    pub selected_bank: String,
    pub address: String,
    pub items: Vec<OrderLineRequest>,
}

/// Multipart body of `POST /api/orders`.
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct CreateOrderForm {
    pub phone_number: String,
    pub selected_bank: String,
    pub address: String,
    /// JSON array of `{ "product_id": "...", "quantity": 1 }`.
    pub items: String,
    #[schema(value_type = Option<String>, format = Binary)]
    pub receipt: Option<Vec<u8>>,
}

/// Updates an item when `item_id` is present, the order otherwise.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub item_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CancelItemRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct OrderList {
    #[schema(value_type = Vec<OrderWithItems>)]
    pub items: Vec<OrderWithItems>,
}
