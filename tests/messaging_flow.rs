mod common;

use campus_market_api::{
    dto::messages::{GetMessagesRequest, ProductSendMessageRequest, SendMessageRequest},
    error::AppError,
    models::ConversationKind,
    services::message_service,
};

fn text(receiver: uuid::Uuid, body: &str) -> SendMessageRequest {
    SendMessageRequest {
        receiver_id: Some(receiver),
        body: Some(body.into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn both_directions_share_one_conversation() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let a = common::create_user(&state, "Almaz").await?;
    let b = common::create_user(&state, "Biniam").await?;

    let first = message_service::send_direct(&state, &a, text(b.user_id, "hi"), None)
        .await?
        .into_data()
        .expect("message");
    let second = message_service::send_direct(&state, &b, text(a.user_id, "hello"), None)
        .await?
        .into_data()
        .expect("message");
    assert_eq!(first.conversation_id, second.conversation_id);

    let ab = message_service::get_direct_messages(
        &state,
        &a,
        GetMessagesRequest {
            sender_id: a.user_id,
            receiver_id: b.user_id,
        },
    )
    .await?
    .into_data()
    .expect("messages");
    let ba = message_service::get_direct_messages(
        &state,
        &b,
        GetMessagesRequest {
            sender_id: b.user_id,
            receiver_id: a.user_id,
        },
    )
    .await?
    .into_data()
    .expect("messages");

    let ids = |list: &[campus_market_api::models::Message]| list.iter().map(|m| m.id).collect::<Vec<_>>();
    assert_eq!(ids(&ab.items), vec![first.id, second.id]);
    assert_eq!(ids(&ab.items), ids(&ba.items));

    // One partner, one unread message addressed to `a`.
    let partners = message_service::list_partners(&state, &a, ConversationKind::Direct, a.user_id)
        .await?
        .into_data()
        .expect("partners");
    assert_eq!(partners.items.len(), 1);
    assert_eq!(partners.items[0].partner.id, b.user_id);
    assert_eq!(partners.items[0].unread_count, 1);
    assert_eq!(
        partners.items[0].last_message.as_ref().map(|m| m.body.as_str()),
        Some("hello")
    );

    // Only the receiver marks a message read; the first read time sticks.
    let err = message_service::mark_read(&state, &a, first.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
    let read = message_service::mark_read(&state, &a, second.id)
        .await?
        .into_data()
        .expect("message");
    assert!(read.is_read);
    let again = message_service::mark_read(&state, &a, second.id)
        .await?
        .into_data()
        .expect("message");
    assert_eq!(again.read_at, read.read_at);

    Ok(())
}

#[tokio::test]
async fn partners_empty_and_invalid_sends() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let loner = common::create_user(&state, "Loner").await?;
    let partners = message_service::list_partners(&state, &loner, ConversationKind::Direct, loner.user_id)
        .await?
        .into_data()
        .expect("partners");
    assert!(partners.items.is_empty());

    let err = message_service::send_direct(&state, &loner, text(loner.user_id, "me"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = message_service::send_direct(&state, &loner, text(uuid::Uuid::new_v4(), "anyone?"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let other = common::create_user(&state, "Other").await?;
    let err = message_service::send_direct(&state, &loner, text(other.user_id, "   "), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    Ok(())
}

#[tokio::test]
async fn product_thread_is_separate_and_tags_the_seller() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };

    let seller = common::create_user(&state, "Seller").await?;
    let buyer = common::create_user(&state, "Buyer").await?;
    let outsider = common::create_user(&state, "Outsider").await?;

    let request = |body: &str| ProductSendMessageRequest {
        seller_id: Some(seller.user_id),
        user_id: Some(buyer.user_id),
        body: Some(body.into()),
        ..Default::default()
    };

    let err = message_service::send_product(&state, &outsider, request("hey"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    message_service::send_product(&state, &buyer, request("is it available?"), None).await?;
    let image = message_service::send_product(
        &state,
        &seller,
        request("photo"),
        Some(common::image("lamp.png")),
    )
    .await?
    .into_data()
    .expect("message");
    assert!(image.is_image);
    assert!(image.body.starts_with("https://img.test/"));
    assert_eq!(image.sender_is_seller, Some(true));

    let thread = message_service::get_product_messages(&state, &buyer, seller.user_id, buyer.user_id)
        .await?
        .into_data()
        .expect("messages");
    assert_eq!(thread.items.len(), 2);
    assert_eq!(thread.items[0].sender_is_seller, Some(false));

    // The direct surface has no thread between them.
    let direct = message_service::list_messages(
        &state,
        ConversationKind::Direct,
        seller.user_id,
        buyer.user_id,
    )
    .await?;
    assert!(direct.is_empty());

    Ok(())
}
