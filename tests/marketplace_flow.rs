mod common;

use campus_market_api::{
    dto::{
        orders::{CancelItemRequest, CreateOrderRequest, OrderLineRequest, UpdateStatusRequest},
        products::{AddCommentRequest, UpdateProductRequest},
    },
    entity::products::Entity as Products,
    error::AppError,
    middleware::auth::AuthUser,
    models::{ConversationKind, ItemStatus, OrderStatus},
    routes::params::SearchQuery,
    services::{account_service, message_service, order_service, product_service},
    state::AppState,
};
use sea_orm::EntityTrait;
use uuid::Uuid;

fn order_request(product_id: Uuid, quantity: i32) -> CreateOrderRequest {
    CreateOrderRequest {
        phone_number: "+251911000000".into(),
        selected_bank: "CBE".into(),
        address: "Dorm 4, Room 12".into(),
        items: vec![OrderLineRequest {
            product_id,
            quantity,
        }],
    }
}

fn item_status(status: &str, item_id: Uuid) -> UpdateStatusRequest {
    UpdateStatusRequest {
        status: status.into(),
        item_id: Some(item_id),
    }
}

async fn stock_of(state: &AppState, product_id: Uuid) -> anyhow::Result<i32> {
    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .expect("product row");
    Ok(product.stock)
}

async fn balance_of(state: &AppState, seller: &AuthUser) -> anyhow::Result<i64> {
    let account = account_service::get_account(state, seller, seller.user_id)
        .await?
        .into_data()
        .expect("account");
    Ok(account.balance)
}

// Discounted product -> order -> delivery credits the seller once and freezes the item.
#[tokio::test]
async fn delivery_moves_stock_and_money_exactly_once() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let seller = common::create_user(&state, "Seller").await?;
    let buyer = common::create_user(&state, "Buyer").await?;
    let product = common::create_product(&state, &seller, "Desk lamp", 100, 20, 5, vec![]).await?;
    assert_eq!(product.effective_price, 80);

    let created = order_service::create_order(&state, &buyer, order_request(product.id, 2), None)
        .await?
        .into_data()
        .expect("order");
    assert_eq!(created.order.total_amount, 160);
    assert_eq!(created.order.status, OrderStatus::Pending);
    let item = &created.items[0];
    assert_eq!(item.price, 80);
    assert_eq!(item.quantity, 2);
    assert_eq!(item.product_name.as_deref(), Some("Desk lamp"));
    let (order_id, item_id) = (created.order.id, item.id);

    // Seller is told about the order.
    let thread = message_service::list_messages(
        &state,
        ConversationKind::Direct,
        seller.user_id,
        buyer.user_id,
    )
    .await?;
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].sender_id, buyer.user_id);
    assert_eq!(thread[0].body, "You have a new order for product Desk lamp");

    // Stock is untouched until delivery.
    assert_eq!(stock_of(&state, product.id).await?, 5);

    let delivered = order_service::update_status(
        &state,
        &seller,
        order_id,
        item_status("delivered", item_id),
    )
    .await?
    .into_data()
    .expect("order");
    assert_eq!(delivered.items[0].status, ItemStatus::Delivered);
    assert_eq!(stock_of(&state, product.id).await?, 3);

    let account = account_service::get_account(&state, &seller, seller.user_id)
        .await?
        .into_data()
        .expect("account");
    assert_eq!(account.balance, 160);
    assert_eq!(account.history.len(), 1);
    assert_eq!(account.history[0].amount, 160);
    assert_eq!(account.history[0].balance_after, 160);
    assert_eq!(account.history[0].reference, format!("Order {order_id}"));

    // Terminal: every further write is refused and nothing moves.
    for next in ["delivered", "cancelled", "pending"] {
        let err = order_service::update_status(&state, &seller, order_id, item_status(next, item_id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)), "{next}: {err:?}");
    }
    let err = order_service::cancel_item(
        &state,
        &buyer,
        order_id,
        item_id,
        CancelItemRequest {
            reason: Some("changed my mind".into()),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    assert_eq!(stock_of(&state, product.id).await?, 3);
    assert_eq!(balance_of(&state, &seller).await?, 160);
    let order = order_service::get_order(&state, &buyer, order_id)
        .await?
        .into_data()
        .expect("order");
    assert_eq!(order.items[0].status, ItemStatus::Delivered);

    Ok(())
}

#[tokio::test]
async fn cancelling_a_pending_item_notifies_the_seller() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let seller = common::create_user(&state, "Seller").await?;
    let buyer = common::create_user(&state, "Buyer").await?;
    let stranger = common::create_user(&state, "Stranger").await?;
    let product = common::create_product(&state, &seller, "Lab coat", 400, 0, 2, vec![]).await?;

    let created = order_service::create_order(&state, &buyer, order_request(product.id, 1), None)
        .await?
        .into_data()
        .expect("order");
    let (order_id, item_id) = (created.order.id, created.items[0].id);

    // Only the buyer, the seller or an admin may cancel.
    let err = order_service::cancel_item(&state, &stranger, order_id, item_id, CancelItemRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let cancelled = order_service::cancel_item(&state, &buyer, order_id, item_id, CancelItemRequest::default())
        .await?
        .into_data()
        .expect("order");
    assert_eq!(cancelled.items[0].status, ItemStatus::Cancelled);

    // Repeating the cancel is accepted.
    order_service::cancel_item(&state, &buyer, order_id, item_id, CancelItemRequest::default()).await?;

    let thread = message_service::list_messages(
        &state,
        ConversationKind::Direct,
        buyer.user_id,
        seller.user_id,
    )
    .await?;
    let last = thread.last().expect("cancel notice");
    assert_eq!(
        last.body,
        format!("Order item {item_id} has been cancelled. Reason: Not specified")
    );

    // Cancelled is terminal for the status endpoint.
    let err = order_service::update_status(&state, &seller, order_id, item_status("delivered", item_id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(stock_of(&state, product.id).await?, 2);

    // Strangers cannot see the order at all.
    let err = order_service::get_order(&state, &stranger, order_id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    Ok(())
}

#[tokio::test]
async fn order_creation_rejects_bad_lines() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let seller = common::create_user(&state, "Seller").await?;
    let buyer = common::create_user(&state, "Buyer").await?;
    let product = common::create_product(&state, &seller, "Calculator", 900, 0, 1, vec![]).await?;

    let err = order_service::create_order(&state, &buyer, order_request(product.id, 2), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)), "stock: {err:?}");

    let err = order_service::create_order(&state, &seller, order_request(product.id, 1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)), "own product: {err:?}");

    let err = order_service::create_order(&state, &buyer, order_request(Uuid::new_v4(), 1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "missing product: {err:?}");

    product_service::delete_product(&state, &seller, product.id).await?;
    let err = order_service::create_order(&state, &buyer, order_request(product.id, 1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "inactive product: {err:?}");

    // Soft-deleted products stay readable.
    let detail = product_service::get_product(&state, product.id)
        .await?
        .into_data()
        .expect("detail");
    assert!(!detail.product.is_active);

    Ok(())
}

#[tokio::test]
async fn order_status_is_separate_from_item_status() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let seller = common::create_user(&state, "Seller").await?;
    let buyer = common::create_user(&state, "Buyer").await?;
    let product = common::create_product(&state, &seller, "Kettle", 300, 0, 3, vec![]).await?;
    let created = order_service::create_order(&state, &buyer, order_request(product.id, 1), None)
        .await?
        .into_data()
        .expect("order");

    let no_item = |status: &str| UpdateStatusRequest {
        status: status.into(),
        item_id: None,
    };

    let err = order_service::update_status(&state, &seller, created.order.id, no_item("shipped"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = order_service::update_status(&state, &buyer, created.order.id, no_item("accepted"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let accepted = order_service::update_status(&state, &seller, created.order.id, no_item("accepted"))
        .await?
        .into_data()
        .expect("order");
    assert_eq!(accepted.order.status, OrderStatus::Accepted);
    assert_eq!(accepted.items[0].status, ItemStatus::Pending);

    // The seller view only lists orders with that seller's items.
    let other_seller = common::create_user(&state, "Other").await?;
    let orders = order_service::get_seller_orders(&state, &other_seller, other_seller.user_id)
        .await?
        .into_data()
        .expect("orders");
    assert!(orders.items.is_empty());

    Ok(())
}

#[tokio::test]
async fn search_matches_tags_case_insensitively() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let seller = common::create_user(&state, "Seller").await?;
    let tag = format!("Quokka{}", Uuid::new_v4().simple());
    let product =
        common::create_product(&state, &seller, "Plain mug", 50, 0, 1, vec![tag.clone()]).await?;

    let found = product_service::search_products(
        &state,
        SearchQuery {
            query: Some(tag.to_lowercase()),
            category: None,
        },
    )
    .await?
    .into_data()
    .expect("results");
    assert_eq!(found.items.len(), 1);
    assert_eq!(found.items[0].id, product.id);

    // Wildcards are literal.
    let found = product_service::search_products(
        &state,
        SearchQuery {
            query: Some(format!("{}_", &tag[..tag.len() - 1])),
            category: None,
        },
    )
    .await?
    .into_data()
    .expect("results");
    assert!(found.items.is_empty());

    let reader = common::create_user(&state, "Reader").await?;
    let comment = product_service::add_comment(
        &state,
        &reader,
        product.id,
        AddCommentRequest {
            text: "  Still available?  ".into(),
        },
    )
    .await?
    .into_data()
    .expect("comment");
    assert_eq!(comment.author_name, "Reader");
    assert_eq!(comment.text, "Still available?");

    let detail = product_service::get_product(&state, product.id)
        .await?
        .into_data()
        .expect("detail");
    assert_eq!(detail.seller.map(|s| s.id), Some(seller.user_id));
    assert_eq!(detail.comments.len(), 1);

    Ok(())
}

#[tokio::test]
async fn item_price_is_frozen_at_order_time() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let seller = common::create_user(&state, "Seller").await?;
    let buyer = common::create_user(&state, "Buyer").await?;
    let product = common::create_product(&state, &seller, "Backpack", 100, 20, 4, vec![]).await?;

    let created = order_service::create_order(&state, &buyer, order_request(product.id, 2), None)
        .await?
        .into_data()
        .expect("order");
    let (order_id, item_id) = (created.order.id, created.items[0].id);

    let repriced = product_service::update_product(
        &state,
        &seller,
        product.id,
        UpdateProductRequest {
            price: Some(500),
            ..Default::default()
        },
        vec![],
    )
    .await?
    .into_data()
    .expect("product");
    assert_eq!(repriced.effective_price, 400);

    let delivered = order_service::update_status(
        &state,
        &seller,
        order_id,
        item_status("delivered", item_id),
    )
    .await?
    .into_data()
    .expect("order");
    assert_eq!(delivered.items[0].price, 80);
    assert_eq!(delivered.items[0].line_total, 160);
    assert_eq!(delivered.order.total_amount, 160);

    let account = account_service::get_account(&state, &seller, seller.user_id)
        .await?
        .into_data()
        .expect("account");
    assert_eq!(account.balance, 160);
    assert_eq!(account.history.len(), 1);
    assert_eq!(account.history[0].amount, 160);

    Ok(())
}

#[tokio::test]
async fn fully_discounted_item_can_be_delivered() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let seller = common::create_user(&state, "Seller").await?;
    let buyer = common::create_user(&state, "Buyer").await?;
    let product = common::create_product(&state, &seller, "Free notes", 100, 100, 3, vec![]).await?;
    assert_eq!(product.effective_price, 0);

    let created = order_service::create_order(&state, &buyer, order_request(product.id, 1), None)
        .await?
        .into_data()
        .expect("order");
    assert_eq!(created.order.total_amount, 0);
    let (order_id, item_id) = (created.order.id, created.items[0].id);

    let delivered = order_service::update_status(
        &state,
        &seller,
        order_id,
        item_status("delivered", item_id),
    )
    .await?
    .into_data()
    .expect("order");
    assert_eq!(delivered.items[0].status, ItemStatus::Delivered);
    assert_eq!(stock_of(&state, product.id).await?, 2);

    // Nothing to credit, so no account is opened.
    let err = account_service::get_account(&state, &seller, seller.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deliveries_apply_once() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let seller = common::create_user(&state, "Seller").await?;
    let buyer = common::create_user(&state, "Buyer").await?;
    let product = common::create_product(&state, &seller, "Monitor", 100, 20, 5, vec![]).await?;
    let created = order_service::create_order(&state, &buyer, order_request(product.id, 2), None)
        .await?
        .into_data()
        .expect("order");
    let (order_id, item_id) = (created.order.id, created.items[0].id);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let state = state.clone();
            let seller = seller.clone();
            tokio::spawn(async move {
                order_service::update_status(
                    &state,
                    &seller,
                    order_id,
                    item_status("delivered", item_id),
                )
                .await
            })
        })
        .collect();

    let mut delivered = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => delivered += 1,
            Err(AppError::Conflict(_)) => {}
            Err(err) => panic!("unexpected error: {err:?}"),
        }
    }
    assert_eq!(delivered, 1);

    assert_eq!(stock_of(&state, product.id).await?, 3);
    let account = account_service::get_account(&state, &seller, seller.user_id)
        .await?
        .into_data()
        .expect("account");
    assert_eq!(account.balance, 160);
    assert_eq!(account.history.len(), 1);

    Ok(())
}
