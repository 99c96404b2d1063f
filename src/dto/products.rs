use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{DeliveryMethod, Product, ProductComment, SellerSummary};

#[derive(Debug, Clone)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: String,
    pub price: i64,
    pub discount: i32,
    pub stock: i32,
    pub category: String,
    pub delivery_method: DeliveryMethod,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub discount: Option<i32>,
    pub stock: Option<i32>,
    pub category: Option<String>,
    pub delivery_method: Option<DeliveryMethod>,
    pub tags: Option<Vec<String>>,
    /// Existing image URLs to keep, in order. `None` keeps all of them.
    pub keep_images: Option<Vec<String>>,
}

/// Multipart body of `POST /api/products`.
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct CreateProductForm {
    pub name: String,
    pub description: String,
    pub price: i64,
    pub discount: Option<i32>,
    pub stock: Option<i32>,
    pub category: String,
    pub delivery_method: Option<DeliveryMethod>,
    /// JSON array or comma separated list.
    pub tags: Option<String>,
    #[schema(value_type = Vec<String>, format = Binary)]
    pub images: Vec<Vec<u8>>,
}

/// Multipart body of `PUT /api/products/{id}`.
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct UpdateProductForm {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub discount: Option<i32>,
    pub stock: Option<i32>,
    pub category: Option<String>,
    pub delivery_method: Option<DeliveryMethod>,
    pub tags: Option<String>,
    /// JSON array of image URLs to keep.
    pub existing_images: Option<String>,
    #[schema(value_type = Vec<String>, format = Binary)]
    pub images: Vec<Vec<u8>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddCommentRequest {
    pub text: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductDetail {
    pub product: Product,
    pub seller: Option<SellerSummary>,
    pub comments: Vec<ProductComment>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}
