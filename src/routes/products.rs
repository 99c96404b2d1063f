use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::products::{
        AddCommentRequest, CreateProductForm, CreateProductRequest, ProductDetail, ProductList,
        UpdateProductForm, UpdateProductRequest,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Product, ProductComment},
    response::ApiResponse,
    routes::{
        form::FormData,
        params::{ProductQuery, SearchQuery},
    },
    services::product_service,
    state::AppState,
};

const IMAGE_FIELDS: &[&str] = &["images", "image", "files"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/search", get(search_products))
        .route("/seller/{seller_id}", get(list_by_seller))
        .route(
            "/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/{id}/comments", post(add_comment))
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("category" = Option<String>, Query, description = "Exact category"),
        ("min_price" = Option<i64>, Query, description = "Minimum list price"),
        ("max_price" = Option<i64>, Query, description = "Maximum list price"),
        ("sort_by" = Option<String>, Query, description = "created_at | price | name"),
        ("sort_order" = Option<String>, Query, description = "asc | desc"),
    ),
    responses(
        (status = 200, description = "List active products", body = ApiResponse<ProductList>)
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::list_products(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/search",
    params(
        ("query" = Option<String>, Query, description = "Matches name, description and tags"),
        ("category" = Option<String>, Query, description = "Exact category"),
    ),
    responses(
        (status = 200, description = "Matching active products", body = ApiResponse<ProductList>)
    ),
    tag = "Products"
)]
pub async fn search_products(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::search_products(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product with seller and comments", body = ApiResponse<ProductDetail>),
        (status = 404, description = "Product not found"),
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ProductDetail>>> {
    let resp = product_service::get_product(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/seller/{seller_id}",
    params(
        ("seller_id" = Uuid, Path, description = "Seller user ID")
    ),
    responses(
        (status = 200, description = "All products of a seller", body = ApiResponse<ProductList>)
    ),
    tag = "Products"
)]
pub async fn list_by_seller(
    State(state): State<AppState>,
    Path(seller_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::list_by_seller(&state, seller_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/products",
    request_body(content = CreateProductForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Product created", body = ApiResponse<Product>),
        (status = 400, description = "Invalid product"),
        (status = 502, description = "Image host failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<Product>>> {
    let mut form = FormData::from_multipart(multipart).await?;
    let payload = CreateProductRequest {
        name: form.required("name")?,
        description: form.required("description")?,
        price: form
            .parse("price")?
            .ok_or_else(|| AppError::BadRequest("price is required".into()))?,
        discount: form.parse("discount")?.unwrap_or_default(),
        stock: form.parse("stock")?.unwrap_or_default(),
        category: form.required("category")?,
        delivery_method: form.parse("delivery_method")?.unwrap_or_default(),
        tags: form.list("tags")?.unwrap_or_default(),
    };
    let images = form.take_files(IMAGE_FIELDS);

    let resp = product_service::create_product(&state, &user, payload, images).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    request_body(content = UpdateProductForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Updated product", body = ApiResponse<Product>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Product not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<Product>>> {
    let mut form = FormData::from_multipart(multipart).await?;
    let payload = UpdateProductRequest {
        name: form.text("name"),
        description: form.text("description"),
        price: form.parse("price")?,
        discount: form.parse("discount")?,
        stock: form.parse("stock")?,
        category: form.text("category"),
        delivery_method: form.parse("delivery_method")?,
        tags: form.list("tags")?,
        keep_images: form.list("existing_images")?,
    };
    let images = form.take_files(IMAGE_FIELDS);

    let resp = product_service::update_product(&state, &user, id, payload, images).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product deactivated"),
        (status = 403, description = "Not the owner or an admin"),
        (status = 404, description = "Product not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = product_service::delete_product(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/products/{id}/comments",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    request_body = AddCommentRequest,
    responses(
        (status = 200, description = "Comment added", body = ApiResponse<ProductComment>),
        (status = 404, description = "Product not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn add_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddCommentRequest>,
) -> AppResult<Json<ApiResponse<ProductComment>>> {
    let resp = product_service::add_comment(&state, &user, id, payload).await?;
    Ok(Json(resp))
}
