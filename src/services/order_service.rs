use std::collections::HashMap;

use chrono::Utc;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{
        CancelItemRequest, CreateOrderRequest, OrderLineRequest, OrderList, OrderWithItems,
        UpdateStatusRequest,
    },
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_self_or_admin},
    models::{ItemStatus, Order, OrderItem, OrderStatus, effective_price},
    response::{ApiResponse, Meta},
    services::{
        account_service,
        message_service::{NewMessage, post_message},
    },
    state::AppState,
    upload::{UploadedFile, validate_image},
};

/// Name and first image shown next to an order line.
type ProductSummary = (String, Option<String>);

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
    receipt: Option<UploadedFile>,
) -> AppResult<ApiResponse<OrderWithItems>> {
    for (field, value) in [
        ("phone_number", &payload.phone_number),
        ("selected_bank", &payload.selected_bank),
        ("address", &payload.address),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("{field} is required")));
        }
    }
    let lines = merge_lines(payload.items)?;

    let receipt_image = match receipt {
        Some(file) => {
            validate_image(&file, state.config.max_upload_bytes)?;
            Some(state.images.upload(file).await?)
        }
        None => None,
    };

    let txn = state.orm.begin().await?;

    let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
    let products: HashMap<Uuid, ProductModel> = Products::find()
        .filter(ProdCol::Id.is_in(ids))
        .all(&txn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut priced = Vec::with_capacity(lines.len());
    let mut total_amount: i64 = 0;
    for line in &lines {
        let product = products
            .get(&line.product_id)
            .filter(|p| p.is_active)
            .ok_or_else(|| AppError::not_found(format!("Product {}", line.product_id)))?;

        if product.seller_id == user.user_id {
            return Err(AppError::BadRequest(format!(
                "You cannot order your own product {}",
                product.name
            )));
        }
        if product.stock < line.quantity {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for product {}",
                product.name
            )));
        }

        let unit_price = effective_price(product.price, product.discount);
        total_amount = unit_price
            .checked_mul(line.quantity as i64)
            .and_then(|line_total| total_amount.checked_add(line_total))
            .ok_or_else(|| AppError::BadRequest("Order total is too large".into()))?;
        priced.push((product, line.quantity, unit_price));
    }

    let now = Utc::now();
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        buyer_id: Set(user.user_id),
        phone_number: Set(payload.phone_number.trim().to_string()),
        selected_bank: Set(payload.selected_bank.trim().to_string()),
        address: Set(payload.address.trim().to_string()),
        receipt_image: Set(receipt_image),
        total_amount: Set(total_amount),
        status: Set(OrderStatus::Pending.as_str().to_string()),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    let mut items = Vec::with_capacity(priced.len());
    for (product, quantity, unit_price) in &priced {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(product.id),
            seller_id: Set(product.seller_id),
            quantity: Set(*quantity),
            price: Set(*unit_price),
            status: Set(ItemStatus::Pending.as_str().to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;
        items.push(order_item_from_entity(item, Some(summary_of(product)))?);
    }

    let sold: Vec<(Uuid, &str)> = priced
        .iter()
        .map(|(p, _, _)| (p.seller_id, p.name.as_str()))
        .collect();
    for (seller_id, text) in seller_notifications(&sold) {
        post_message(&txn, NewMessage::notice(user.user_id, seller_id, text)).await?;
    }

    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        buyer_id = %user.user_id,
        total_amount,
        items = items.len(),
        "order created"
    );
    audit::record(
        &state.pool,
        user.user_id,
        "order_create",
        "orders",
        serde_json::json!({ "order_id": order.id, "total_amount": total_amount }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order created",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn get_buyer_orders(
    state: &AppState,
    user: &AuthUser,
    buyer_id: Uuid,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_self_or_admin(user, buyer_id)?;

    let orders = Orders::find()
        .filter(OrderCol::BuyerId.eq(buyer_id))
        .order_by_desc(OrderCol::CreatedAt)
        .all(&state.orm)
        .await?;
    let items = load_views(&state.orm, orders, None).await?;

    let meta = Meta::total(items.len());
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)))
}

/// Orders containing at least one item sold by `seller_id`, each showing
/// only that seller's items.
pub async fn get_seller_orders(
    state: &AppState,
    user: &AuthUser,
    seller_id: Uuid,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_self_or_admin(user, seller_id)?;

    let order_ids: Vec<Uuid> = OrderItems::find()
        .select_only()
        .column(OrderItemCol::OrderId)
        .filter(OrderItemCol::SellerId.eq(seller_id))
        .distinct()
        .into_tuple()
        .all(&state.orm)
        .await?;

    let orders = if order_ids.is_empty() {
        Vec::new()
    } else {
        Orders::find()
            .filter(OrderCol::Id.is_in(order_ids))
            .order_by_desc(OrderCol::CreatedAt)
            .all(&state.orm)
            .await?
    };
    let items = load_views(&state.orm, orders, Some(seller_id)).await?;

    let meta = Meta::total(items.len());
    Ok(ApiResponse::success("Seller orders", OrderList { items }, Some(meta)))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let view = order_view(&state.orm, user, id).await?;
    Ok(ApiResponse::success("OK", view, Some(Meta::empty())))
}

/// Item status when `item_id` is given, order status otherwise.
pub async fn update_status(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    payload: UpdateStatusRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    match payload.item_id {
        Some(item_id) => {
            let next: ItemStatus = payload.status.parse()?;
            update_item_status(state, user, order_id, item_id, next).await
        }
        None => {
            let next: OrderStatus = payload.status.parse()?;
            update_order_status(state, user, order_id, next).await
        }
    }
}

/// Moves one item through its state machine. Delivery decrements stock,
/// credits the seller and notifies the buyer in the same transaction as
/// the status write.
pub async fn update_item_status(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    item_id: Uuid,
    next: ItemStatus,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(order_id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;
    let item = locked_item(&txn, order_id, item_id).await?;

    if !user.is_self_or_admin(item.seller_id) {
        return Err(AppError::Forbidden);
    }

    let current: ItemStatus = item.status.parse()?;
    let next = current.transition(next)?;

    if next == ItemStatus::Delivered {
        let updated = Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(item.quantity))
            .col_expr(ProdCol::UpdatedAt, Expr::value(Utc::now()))
            .filter(
                Condition::all()
                    .add(ProdCol::Id.eq(item.product_id))
                    .add(ProdCol::Stock.gte(item.quantity)),
            )
            .exec(&txn)
            .await?;
        if updated.rows_affected == 0 {
            let exists = Products::find_by_id(item.product_id).count(&txn).await? > 0;
            if !exists {
                return Err(AppError::not_found("Product"));
            }
            return Err(AppError::Conflict(format!(
                "Insufficient stock to deliver {} unit(s)",
                item.quantity
            )));
        }

        let amount = item
            .price
            .checked_mul(item.quantity as i64)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("line total overflow")))?;
        // Fully discounted items leave no ledger entry.
        if amount > 0 {
            account_service::credit(&txn, item.seller_id, amount, &format!("Order {order_id}"))
                .await?;
        }
    }

    let seller_id = item.seller_id;
    let mut active: OrderItemActive = item.into();
    active.status = Set(next.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    active.update(&txn).await?;

    post_message(
        &txn,
        NewMessage::notice(
            seller_id,
            order.buyer_id,
            format!("Your order item status has been updated to {next}"),
        ),
    )
    .await?;

    let view = order_view(&txn, user, order_id).await?;
    txn.commit().await?;

    tracing::info!(
        %order_id,
        %item_id,
        from = current.as_str(),
        to = next.as_str(),
        "order item status changed"
    );
    audit::record(
        &state.pool,
        user.user_id,
        "order_item_status",
        "order_items",
        serde_json::json!({ "order_id": order_id, "item_id": item_id, "status": next.as_str() }),
    )
    .await;

    Ok(ApiResponse::success("Order item updated", view, Some(Meta::empty())))
}

pub async fn cancel_item(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    item_id: Uuid,
    payload: CancelItemRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(order_id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;
    let item = locked_item(&txn, order_id, item_id).await?;

    if !user.is_self_or_admin(order.buyer_id) && user.user_id != item.seller_id {
        return Err(AppError::Forbidden);
    }

    let current: ItemStatus = item.status.parse()?;
    let next = current.cancel()?;

    let seller_id = item.seller_id;
    let mut active: OrderItemActive = item.into();
    active.status = Set(next.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    active.update(&txn).await?;

    let reason = payload
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("Not specified");
    post_message(
        &txn,
        NewMessage::notice(
            order.buyer_id,
            seller_id,
            format!("Order item {item_id} has been cancelled. Reason: {reason}"),
        ),
    )
    .await?;

    let view = order_view(&txn, user, order_id).await?;
    txn.commit().await?;

    tracing::info!(%order_id, %item_id, reason, "order item cancelled");
    audit::record(
        &state.pool,
        user.user_id,
        "order_item_cancel",
        "order_items",
        serde_json::json!({ "order_id": order_id, "item_id": item_id, "reason": reason }),
    )
    .await;

    Ok(ApiResponse::success("Order item cancelled", view, Some(Meta::empty())))
}

/// Order-level status. Allowed for admins and sellers with an item in the order.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    next: OrderStatus,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;

    if !user.is_admin() {
        let sells_in_order = OrderItems::find()
            .filter(
                Condition::all()
                    .add(OrderItemCol::OrderId.eq(order_id))
                    .add(OrderItemCol::SellerId.eq(user.user_id)),
            )
            .count(&state.orm)
            .await?
            > 0;
        if !sells_in_order {
            return Err(AppError::Forbidden);
        }
    }

    let mut active: OrderActive = order.into();
    active.status = Set(next.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    active.update(&state.orm).await?;

    tracing::info!(%order_id, status = next.as_str(), "order status changed");
    audit::record(
        &state.pool,
        user.user_id,
        "order_status",
        "orders",
        serde_json::json!({ "order_id": order_id, "status": next.as_str() }),
    )
    .await;

    let view = order_view(&state.orm, user, order_id).await?;
    Ok(ApiResponse::success("Order updated", view, Some(Meta::empty())))
}

async fn locked_item<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    item_id: Uuid,
) -> AppResult<OrderItemModel> {
    OrderItems::find()
        .filter(
            Condition::all()
                .add(OrderItemCol::Id.eq(item_id))
                .add(OrderItemCol::OrderId.eq(order_id)),
        )
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Order item"))
}

/// The order as `actor` may see it.
async fn order_view<C: ConnectionTrait>(
    conn: &C,
    actor: &AuthUser,
    id: Uuid,
) -> AppResult<OrderWithItems> {
    let order = Orders::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;
    let buyer_id = order.buyer_id;

    let view = load_views(conn, vec![order], None)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::not_found("Order"))?;

    let items = visible_items(actor, buyer_id, view.items).ok_or_else(|| AppError::not_found("Order"))?;
    Ok(OrderWithItems {
        order: view.order,
        items,
    })
}

/// Attaches items (optionally only one seller's) and product summaries.
/// With a seller filter, orders left without items are dropped.
async fn load_views<C: ConnectionTrait>(
    conn: &C,
    orders: Vec<OrderModel>,
    seller: Option<Uuid>,
) -> AppResult<Vec<OrderWithItems>> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut condition = Condition::all().add(OrderItemCol::OrderId.is_in(order_ids));
    if let Some(seller_id) = seller {
        condition = condition.add(OrderItemCol::SellerId.eq(seller_id));
    }
    let item_models = OrderItems::find()
        .filter(condition)
        .order_by_asc(OrderItemCol::CreatedAt)
        .order_by_asc(OrderItemCol::Id)
        .all(conn)
        .await?;

    let product_ids: Vec<Uuid> = item_models.iter().map(|i| i.product_id).collect();
    let summaries: HashMap<Uuid, ProductSummary> = if product_ids.is_empty() {
        HashMap::new()
    } else {
        Products::find()
            .filter(ProdCol::Id.is_in(product_ids))
            .all(conn)
            .await?
            .iter()
            .map(|p| (p.id, summary_of(p)))
            .collect()
    };

    let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for model in item_models {
        let summary = summaries.get(&model.product_id).cloned();
        let order_id = model.order_id;
        grouped
            .entry(order_id)
            .or_default()
            .push(order_item_from_entity(model, summary)?);
    }

    let mut views = Vec::with_capacity(orders.len());
    for order in orders {
        let items = grouped.remove(&order.id).unwrap_or_default();
        if seller.is_some() && items.is_empty() {
            continue;
        }
        views.push(OrderWithItems {
            order: order_from_entity(order)?,
            items,
        });
    }
    Ok(views)
}

/// Validates requested lines and merges repeats of the same product.
pub fn merge_lines(lines: Vec<OrderLineRequest>) -> AppResult<Vec<OrderLineRequest>> {
    if lines.is_empty() {
        return Err(AppError::BadRequest("Order must contain at least one item".into()));
    }

    let mut merged: Vec<OrderLineRequest> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity <= 0 {
            return Err(AppError::BadRequest(format!(
                "Quantity for product {} must be greater than 0",
                line.product_id
            )));
        }
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(line.quantity)
                    .ok_or_else(|| AppError::BadRequest("Quantity is too large".into()))?;
            }
            None => merged.push(line),
        }
    }
    Ok(merged)
}

/// One notice per seller, in order of first appearance.
pub fn seller_notifications(sold: &[(Uuid, &str)]) -> Vec<(Uuid, String)> {
    let mut grouped: Vec<(Uuid, Vec<&str>)> = Vec::new();
    for &(seller_id, name) in sold {
        match grouped.iter_mut().find(|(id, _)| *id == seller_id) {
            Some((_, names)) => names.push(name),
            None => grouped.push((seller_id, vec![name])),
        }
    }

    grouped
        .into_iter()
        .map(|(seller_id, names)| {
            let text = if names.len() == 1 {
                format!("You have a new order for product {}", names[0])
            } else {
                format!("You have a new order for products {}", names.join(", "))
            };
            (seller_id, text)
        })
        .collect()
}

/// Buyers and admins see every item; a seller sees only their own. `None`
/// means the actor has no business with the order.
pub fn visible_items(actor: &AuthUser, buyer_id: Uuid, items: Vec<OrderItem>) -> Option<Vec<OrderItem>> {
    if actor.is_self_or_admin(buyer_id) {
        return Some(items);
    }
    let own: Vec<OrderItem> = items
        .into_iter()
        .filter(|i| i.seller_id == actor.user_id)
        .collect();
    if own.is_empty() { None } else { Some(own) }
}

fn summary_of(product: &ProductModel) -> ProductSummary {
    (product.name.clone(), product.images.first().cloned())
}

fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    Ok(Order {
        id: model.id,
        buyer_id: model.buyer_id,
        phone_number: model.phone_number,
        selected_bank: model.selected_bank,
        address: model.address,
        receipt_image: model.receipt_image,
        total_amount: model.total_amount,
        status: model.status.parse()?,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn order_item_from_entity(model: OrderItemModel, product: Option<ProductSummary>) -> AppResult<OrderItem> {
    let (product_name, product_image) = match product {
        Some((name, image)) => (Some(name), image),
        None => (None, None),
    };
    let line_total = model
        .price
        .checked_mul(model.quantity as i64)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("line total overflow")))?;
    Ok(OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        seller_id: model.seller_id,
        product_name,
        product_image,
        quantity: model.quantity,
        price: model.price,
        line_total,
        status: model.status.parse()?,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ROLE_ADMIN, ROLE_USER};

    fn line(product_id: Uuid, quantity: i32) -> OrderLineRequest {
        OrderLineRequest {
            product_id,
            quantity,
        }
    }

    fn item(seller_id: Uuid) -> OrderItem {
        let now = Utc::now();
        OrderItem {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            seller_id,
            product_name: Some("Lamp".into()),
            product_image: None,
            quantity: 1,
            price: 80,
            line_total: 80,
            status: ItemStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    fn actor(user_id: Uuid, role: &str) -> AuthUser {
        AuthUser {
            user_id,
            role: role.into(),
        }
    }

    #[test]
    fn merge_lines_rejects_empty_and_non_positive() {
        assert!(matches!(merge_lines(vec![]), Err(AppError::BadRequest(_))));
        let p = Uuid::new_v4();
        assert!(matches!(merge_lines(vec![line(p, 0)]), Err(AppError::BadRequest(_))));
        assert!(merge_lines(vec![line(p, -3)]).is_err());
    }

    #[test]
    fn merge_lines_sums_repeated_products() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = merge_lines(vec![line(a, 1), line(b, 2), line(a, 3)]).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].product_id, a);
        assert_eq!(merged[0].quantity, 4);
        assert_eq!(merged[1].quantity, 2);
    }

    #[test]
    fn one_notification_per_seller() {
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        let notes = seller_notifications(&[(s1, "Lamp"), (s2, "Desk"), (s1, "Chair")]);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0], (s1, "You have a new order for products Lamp, Chair".to_string()));
        assert_eq!(notes[1], (s2, "You have a new order for product Desk".to_string()));
    }

    #[test]
    fn buyer_and_admin_see_every_item() {
        let buyer = Uuid::new_v4();
        let items = vec![item(Uuid::new_v4()), item(Uuid::new_v4())];

        let seen = visible_items(&actor(buyer, ROLE_USER), buyer, items.clone()).unwrap();
        assert_eq!(seen.len(), 2);
        let seen = visible_items(&actor(Uuid::new_v4(), ROLE_ADMIN), buyer, items).unwrap();
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn seller_sees_only_own_items_and_strangers_see_nothing() {
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let items = vec![item(seller), item(Uuid::new_v4())];

        let seen = visible_items(&actor(seller, ROLE_USER), buyer, items.clone()).unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].seller_id, seller);

        assert!(visible_items(&actor(Uuid::new_v4(), ROLE_USER), buyer, items).is_none());
    }

    #[test]
    fn line_total_uses_frozen_unit_price() {
        let now = Utc::now();
        let model = OrderItemModel {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            quantity: 2,
            price: 80,
            status: "pending".into(),
            created_at: now.into(),
            updated_at: now.into(),
        };
        let item = order_item_from_entity(model, Some(("Lamp".into(), None))).unwrap();
        assert_eq!(item.line_total, 160);
        assert_eq!(item.product_name.as_deref(), Some("Lamp"));
    }

    #[test]
    fn oversized_line_total_is_an_error() {
        let now = Utc::now();
        let model = OrderItemModel {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            quantity: 3,
            price: i64::MAX / 2,
            status: "pending".into(),
            created_at: now.into(),
            updated_at: now.into(),
        };
        assert!(matches!(
            order_item_from_entity(model, None),
            Err(AppError::Internal(_))
        ));
    }
}
