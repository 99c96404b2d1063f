use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::products::{
        AddCommentRequest, CreateProductRequest, ProductDetail, ProductList, UpdateProductRequest,
    },
    entity::{
        product_comments::{
            ActiveModel as CommentActive, Column as CommentCol, Entity as ProductComments,
            Model as CommentModel,
        },
        products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
        users::{Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{MAX_DISCOUNT, MAX_PRICE, Product, ProductComment, SellerSummary, effective_price},
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SearchQuery, SortOrder},
    state::AppState,
    upload::{UploadedFile, upload_all},
};

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(Column::IsActive.eq(true));

    if let Some(category) = query.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        condition = condition.add(Column::Category.eq(category));
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };
    finder = finder.order_by_asc(Column::Id);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

/// Case-insensitive literal substring match over name, description and tags.
/// A blank query lists every active product.
pub async fn search_products(
    state: &AppState,
    query: SearchQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let mut condition = Condition::all().add(Column::IsActive.eq(true));

    if let Some(category) = query.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        condition = condition.add(Column::Category.eq(category));
    }

    if let Some(term) = query.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = like_pattern(term);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern.clone()))
                .add(Expr::cust_with_values(
                    "EXISTS (SELECT 1 FROM unnest(tags) AS tag WHERE tag ILIKE $1)",
                    [pattern],
                )),
        );
    }

    let items = Products::find()
        .filter(condition)
        .order_by_desc(Column::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::total(items.len());
    Ok(ApiResponse::success("Search results", ProductList { items }, Some(meta)))
}

/// Soft-deleted products are still returned; orders keep pointing at them.
pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<ProductDetail>> {
    let product = find_product(state, id).await?;

    let seller = Users::find_by_id(product.seller_id)
        .one(&state.orm)
        .await?
        .map(seller_summary);

    let comments = ProductComments::find()
        .filter(CommentCol::ProductId.eq(id))
        .order_by_asc(CommentCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(comment_from_entity)
        .collect();

    let detail = ProductDetail {
        product: product_from_entity(product)?,
        seller,
        comments,
    };
    Ok(ApiResponse::success("Product", detail, None))
}

pub async fn list_by_seller(
    state: &AppState,
    seller_id: Uuid,
) -> AppResult<ApiResponse<ProductList>> {
    let items = Products::find()
        .filter(Column::SellerId.eq(seller_id))
        .order_by_desc(Column::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::total(items.len());
    Ok(ApiResponse::success("Seller products", ProductList { items }, Some(meta)))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
    images: Vec<UploadedFile>,
) -> AppResult<ApiResponse<Product>> {
    validate_new_product(&payload)?;
    if images.is_empty() {
        return Err(AppError::BadRequest(
            "at least one product image is required".into(),
        ));
    }

    let urls = upload_all(state.images.as_ref(), images, state.config.max_upload_bytes).await?;

    let now = Utc::now();
    let product = ActiveModel {
        id: Set(Uuid::new_v4()),
        seller_id: Set(user.user_id),
        name: Set(payload.name.trim().to_string()),
        description: Set(payload.description.trim().to_string()),
        price: Set(payload.price),
        discount: Set(payload.discount),
        stock: Set(payload.stock),
        category: Set(payload.category.trim().to_string()),
        delivery_method: Set(payload.delivery_method.as_str().to_string()),
        images: Set(urls),
        tags: Set(normalize_tags(payload.tags)),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.pool,
        user.user_id,
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        product_from_entity(product)?,
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
    new_images: Vec<UploadedFile>,
) -> AppResult<ApiResponse<Product>> {
    let existing = find_product(state, id).await?;
    if existing.seller_id != user.user_id {
        return Err(AppError::Forbidden);
    }

    validate_update(&existing, &payload)?;

    let kept = kept_images(&existing.images, payload.keep_images.as_deref());
    if kept.is_empty() && new_images.is_empty() {
        return Err(AppError::BadRequest(
            "a product needs at least one image".into(),
        ));
    }

    let uploaded =
        upload_all(state.images.as_ref(), new_images, state.config.max_upload_bytes).await?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(description.trim().to_string());
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(discount) = payload.discount {
        active.discount = Set(discount);
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }
    if let Some(category) = payload.category {
        active.category = Set(category.trim().to_string());
    }
    if let Some(method) = payload.delivery_method {
        active.delivery_method = Set(method.as_str().to_string());
    }
    if let Some(tags) = payload.tags {
        active.tags = Set(normalize_tags(tags));
    }
    active.images = Set(kept.into_iter().chain(uploaded).collect());
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        user.user_id,
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        product_from_entity(product)?,
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing = find_product(state, id).await?;
    if !user.is_self_or_admin(existing.seller_id) {
        return Err(AppError::Forbidden);
    }

    let mut active: ActiveModel = existing.into();
    active.is_active = Set(false);
    active.updated_at = Set(Utc::now().into());
    active.update(&state.orm).await?;

    tracing::info!(product_id = %id, actor = %user.user_id, "product deactivated");
    audit::record(
        &state.pool,
        user.user_id,
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn add_comment(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: AddCommentRequest,
) -> AppResult<ApiResponse<ProductComment>> {
    let text = payload.text.trim();
    if text.is_empty() {
        return Err(AppError::BadRequest("comment text is required".into()));
    }

    find_product(state, product_id).await?;

    let author = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let comment = CommentActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        author_id: Set(author.id),
        author_name: Set(author.name),
        author_image: Set(author.image),
        text: Set(text.to_string()),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    Ok(ApiResponse::success(
        "Comment added",
        comment_from_entity(comment),
        Some(Meta::empty()),
    ))
}

async fn find_product(state: &AppState, id: Uuid) -> AppResult<ProductModel> {
    Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))
}

fn validate_new_product(payload: &CreateProductRequest) -> AppResult<()> {
    for (field, value) in [
        ("name", &payload.name),
        ("description", &payload.description),
        ("category", &payload.category),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("{field} is required")));
        }
    }
    validate_numbers(Some(payload.price), Some(payload.discount), Some(payload.stock))
}

fn validate_update(existing: &ProductModel, payload: &UpdateProductRequest) -> AppResult<()> {
    for (field, value) in [
        ("name", &payload.name),
        ("description", &payload.description),
        ("category", &payload.category),
    ] {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(AppError::BadRequest(format!("{field} cannot be empty")));
        }
    }
    validate_numbers(payload.price, payload.discount, payload.stock)?;

    // Stock only goes down through delivery.
    match payload.stock {
        Some(stock) if stock < existing.stock => Err(AppError::BadRequest(format!(
            "stock can only be raised (current {}, requested {stock})",
            existing.stock
        ))),
        _ => Ok(()),
    }
}

fn validate_numbers(price: Option<i64>, discount: Option<i32>, stock: Option<i32>) -> AppResult<()> {
    if price.is_some_and(|p| p < 0) {
        return Err(AppError::BadRequest("price cannot be negative".into()));
    }
    if price.is_some_and(|p| p > MAX_PRICE) {
        return Err(AppError::BadRequest(format!(
            "price cannot exceed {MAX_PRICE}"
        )));
    }
    if discount.is_some_and(|d| !(0..=MAX_DISCOUNT).contains(&d)) {
        return Err(AppError::BadRequest(format!(
            "discount must be between 0 and {MAX_DISCOUNT}"
        )));
    }
    if stock.is_some_and(|s| s < 0) {
        return Err(AppError::BadRequest("stock cannot be negative".into()));
    }
    Ok(())
}

/// Existing images the caller asked to keep, in stored order. Unknown URLs
/// are ignored.
fn kept_images(current: &[String], keep: Option<&[String]>) -> Vec<String> {
    match keep {
        None => current.to_vec(),
        Some(keep) => current
            .iter()
            .filter(|url| keep.contains(url))
            .cloned()
            .collect(),
    }
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() || out.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            continue;
        }
        out.push(tag.to_string());
    }
    out
}

/// Escapes LIKE metacharacters so the term matches literally, then wraps it
/// for a substring match.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

pub fn seller_summary(model: UserModel) -> SellerSummary {
    SellerSummary {
        id: model.id,
        name: model.name,
        email: model.email,
        image: model.image,
        bio: model.bio,
        university: model.university,
    }
}

pub fn product_from_entity(model: ProductModel) -> AppResult<Product> {
    Ok(Product {
        id: model.id,
        seller_id: model.seller_id,
        effective_price: effective_price(model.price, model.discount),
        name: model.name,
        description: model.description,
        price: model.price,
        discount: model.discount,
        stock: model.stock,
        category: model.category,
        delivery_method: model.delivery_method.parse()?,
        images: model.images,
        tags: model.tags,
        is_active: model.is_active,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn comment_from_entity(model: CommentModel) -> ProductComment {
    ProductComment {
        id: model.id,
        product_id: model.product_id,
        author_id: model.author_id,
        author_name: model.author_name,
        author_image: model.author_image,
        text: model.text,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeliveryMethod;

    fn request() -> CreateProductRequest {
        CreateProductRequest {
            name: "Calculus textbook".into(),
            description: "Barely used".into(),
            price: 100,
            discount: 20,
            stock: 3,
            category: "books".into(),
            delivery_method: DeliveryMethod::Pickup,
            tags: vec![],
        }
    }

    fn stored(stock: i32) -> ProductModel {
        let now = Utc::now();
        ProductModel {
            id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            name: "Lamp".into(),
            description: "Desk lamp".into(),
            price: 100,
            discount: 0,
            stock,
            category: "home".into(),
            delivery_method: "both".into(),
            images: vec!["a".into(), "b".into()],
            tags: vec![],
            is_active: true,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("lamp"), "%lamp%");
        assert_eq!(like_pattern("50%"), "%50\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
        assert_eq!(like_pattern(r"c:\x"), r"%c:\\x%");
    }

    #[test]
    fn create_validation() {
        assert!(validate_new_product(&request()).is_ok());

        let mut blank = request();
        blank.category = "  ".into();
        assert!(matches!(validate_new_product(&blank), Err(AppError::BadRequest(_))));

        let mut negative = request();
        negative.price = -1;
        assert!(validate_new_product(&negative).is_err());

        let mut discount = request();
        discount.discount = 101;
        assert!(validate_new_product(&discount).is_err());
    }

    #[test]
    fn price_is_bounded() {
        let mut at_max = request();
        at_max.price = MAX_PRICE;
        assert!(validate_new_product(&at_max).is_ok());

        let mut huge = request();
        huge.price = i64::MAX / 2;
        assert!(matches!(
            validate_new_product(&huge),
            Err(AppError::BadRequest(_))
        ));

        let product = stored(1);
        let update = UpdateProductRequest {
            price: Some(MAX_PRICE + 1),
            ..Default::default()
        };
        assert!(matches!(
            validate_update(&product, &update),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn update_may_only_raise_stock() {
        let product = stored(5);
        let raise = UpdateProductRequest {
            stock: Some(8),
            ..Default::default()
        };
        assert!(validate_update(&product, &raise).is_ok());

        let lower = UpdateProductRequest {
            stock: Some(2),
            ..Default::default()
        };
        assert!(matches!(
            validate_update(&product, &lower),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn kept_images_follow_stored_order_and_drop_unknown() {
        let current = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(kept_images(&current, None), current);

        let keep = vec!["c".to_string(), "zzz".to_string(), "a".to_string()];
        assert_eq!(kept_images(&current, Some(keep.as_slice())), vec!["a", "c"]);
        assert!(kept_images(&current, Some(&[][..])).is_empty());
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let tags = vec![" Books ".into(), "books".into(), "".into(), "math".into()];
        assert_eq!(normalize_tags(tags), vec!["Books", "math"]);
    }

    #[test]
    fn product_carries_effective_price() {
        let mut model = stored(1);
        model.discount = 20;
        let product = product_from_entity(model).unwrap();
        assert_eq!(product.effective_price, 80);
        assert_eq!(product.delivery_method, DeliveryMethod::Both);
    }
}
