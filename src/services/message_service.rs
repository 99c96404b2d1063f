use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    dto::messages::{
        GetMessagesRequest, MessageList, PartnerList, ProductSendMessageRequest,
        SendMessageRequest,
    },
    entity::{
        conversations::{
            ActiveModel as ConversationActive, Column as ConvCol, Entity as Conversations,
            Model as ConversationModel,
        },
        messages::{ActiveModel as MessageActive, Column as MsgCol, Entity as Messages, Model as MessageModel},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_self_or_admin},
    models::{ConversationKind, LastMessage, Message, ParticipantPair, PartnerSummary, SellerSummary},
    response::{ApiResponse, Meta},
    state::AppState,
    upload::{UploadedFile, validate_image},
};

/// A message ready to be stored.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub kind: ConversationKind,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub body: String,
    pub is_image: bool,
    pub caption: Option<String>,
    pub reply_to: Option<Uuid>,
}

impl NewMessage {
    /// Plain text notice in the direct thread between two users.
    pub fn notice(sender_id: Uuid, receiver_id: Uuid, body: impl Into<String>) -> Self {
        Self {
            kind: ConversationKind::Direct,
            sender_id,
            receiver_id,
            body: body.into(),
            is_image: false,
            caption: None,
            reply_to: None,
        }
    }
}

/// Message content as submitted, before the image (if any) is uploaded.
#[derive(Debug, Clone, Default)]
struct Draft {
    body: Option<String>,
    is_image: bool,
    caption: Option<String>,
    reply_to: Option<Uuid>,
}

/// Finds or creates the thread for the pair and appends the message.
///
/// The conversation upsert is a single statement on the
/// `(kind, participant_low, participant_high)` unique index, so two first
/// messages racing each other still land in one thread.
pub async fn post_message<C: ConnectionTrait>(conn: &C, msg: NewMessage) -> AppResult<MessageModel> {
    let pair = ParticipantPair::new(msg.sender_id, msg.receiver_id)
        .ok_or_else(|| AppError::BadRequest("cannot send a message to yourself".into()))?;
    let now = Utc::now();

    let conversation = Conversations::insert(ConversationActive {
        id: Set(Uuid::new_v4()),
        kind: Set(msg.kind.as_str().to_string()),
        participant_low: Set(pair.low()),
        participant_high: Set(pair.high()),
        created_at: Set(now.into()),
        last_message_at: Set(now.into()),
    })
    .on_conflict(
        OnConflict::columns([ConvCol::Kind, ConvCol::ParticipantLow, ConvCol::ParticipantHigh])
            .update_column(ConvCol::LastMessageAt)
            .to_owned(),
    )
    .exec_with_returning(conn)
    .await?;

    if let Some(reply_to) = msg.reply_to {
        let target = Messages::find_by_id(reply_to).one(conn).await?;
        match target {
            Some(t) if t.conversation_id == conversation.id => {}
            _ => return Err(AppError::not_found("Reply target message")),
        }
    }

    let message = MessageActive {
        id: Set(Uuid::new_v4()),
        conversation_id: Set(conversation.id),
        kind: Set(msg.kind.as_str().to_string()),
        sender_id: Set(msg.sender_id),
        receiver_id: Set(msg.receiver_id),
        body: Set(msg.body),
        is_image: Set(msg.is_image),
        caption: Set(msg.caption),
        is_read: Set(false),
        read_at: Set(None),
        reply_to: Set(msg.reply_to),
        created_at: Set(now.into()),
    }
    .insert(conn)
    .await?;

    tracing::debug!(
        conversation_id = %conversation.id,
        message_id = %message.id,
        kind = msg.kind.as_str(),
        "message stored"
    );

    Ok(message)
}

pub async fn send_direct(
    state: &AppState,
    user: &AuthUser,
    payload: SendMessageRequest,
    file: Option<UploadedFile>,
) -> AppResult<ApiResponse<Message>> {
    let receiver_id = payload
        .receiver_id
        .ok_or_else(|| AppError::BadRequest("receiver_id is required".into()))?;
    let draft = Draft {
        body: payload.body,
        is_image: payload.is_image,
        caption: payload.caption,
        reply_to: payload.reply_to,
    };

    let message = send(state, ConversationKind::Direct, user.user_id, receiver_id, draft, file).await?;
    Ok(ApiResponse::success(
        "Message sent",
        message_from_entity(message, None)?,
        Some(Meta::empty()),
    ))
}

pub async fn send_product(
    state: &AppState,
    user: &AuthUser,
    payload: ProductSendMessageRequest,
    file: Option<UploadedFile>,
) -> AppResult<ApiResponse<Message>> {
    let (seller_id, user_id) = match (payload.seller_id, payload.user_id) {
        (Some(s), Some(u)) => (s, u),
        _ => {
            return Err(AppError::BadRequest(
                "seller_id and user_id are required".into(),
            ));
        }
    };

    let receiver_id = if user.user_id == seller_id {
        user_id
    } else if user.user_id == user_id {
        seller_id
    } else {
        return Err(AppError::Forbidden);
    };

    let draft = Draft {
        body: payload.body,
        is_image: payload.is_image,
        caption: payload.caption,
        reply_to: payload.reply_to,
    };

    let message = send(state, ConversationKind::Product, user.user_id, receiver_id, draft, file).await?;
    Ok(ApiResponse::success(
        "Message sent",
        message_from_entity(message, Some(seller_id))?,
        Some(Meta::empty()),
    ))
}

async fn send(
    state: &AppState,
    kind: ConversationKind,
    sender_id: Uuid,
    receiver_id: Uuid,
    draft: Draft,
    file: Option<UploadedFile>,
) -> AppResult<MessageModel> {
    if sender_id == receiver_id {
        return Err(AppError::BadRequest(
            "cannot send a message to yourself".into(),
        ));
    }

    let body = draft
        .body
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty());
    if body.is_none() && file.is_none() {
        return Err(AppError::BadRequest("message body is required".into()));
    }

    if Users::find_by_id(receiver_id).one(&state.orm).await?.is_none() {
        return Err(AppError::not_found("Receiver"));
    }

    // Upload before the transaction: a host failure must not leave a thread behind.
    let (body, is_image) = match file {
        Some(file) => {
            validate_image(&file, state.config.max_upload_bytes)?;
            (state.images.upload(file).await?, true)
        }
        None => (body.unwrap_or_default(), draft.is_image),
    };

    let caption = draft
        .caption
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let txn = state.orm.begin().await?;
    let message = post_message(
        &txn,
        NewMessage {
            kind,
            sender_id,
            receiver_id,
            body,
            is_image,
            caption,
            reply_to: draft.reply_to,
        },
    )
    .await?;
    txn.commit().await?;

    Ok(message)
}

pub async fn get_direct_messages(
    state: &AppState,
    user: &AuthUser,
    payload: GetMessagesRequest,
) -> AppResult<ApiResponse<MessageList>> {
    let GetMessagesRequest {
        sender_id,
        receiver_id,
    } = payload;
    if !user.is_admin() && user.user_id != sender_id && user.user_id != receiver_id {
        return Err(AppError::Forbidden);
    }

    let items = list_messages(state, ConversationKind::Direct, sender_id, receiver_id)
        .await?
        .into_iter()
        .map(|m| message_from_entity(m, None))
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::total(items.len());
    Ok(ApiResponse::success("Messages", MessageList { items }, Some(meta)))
}

pub async fn get_product_messages(
    state: &AppState,
    user: &AuthUser,
    seller_id: Uuid,
    user_id: Uuid,
) -> AppResult<ApiResponse<MessageList>> {
    if !user.is_admin() && user.user_id != seller_id && user.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    let items = list_messages(state, ConversationKind::Product, seller_id, user_id)
        .await?
        .into_iter()
        .map(|m| message_from_entity(m, Some(seller_id)))
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::total(items.len());
    Ok(ApiResponse::success("Messages", MessageList { items }, Some(meta)))
}

/// Messages of the thread between `a` and `b`, oldest first. Empty when the
/// two have never talked.
pub async fn list_messages(
    state: &AppState,
    kind: ConversationKind,
    a: Uuid,
    b: Uuid,
) -> AppResult<Vec<MessageModel>> {
    let Some(pair) = ParticipantPair::new(a, b) else {
        return Ok(Vec::new());
    };

    let conversation = find_conversation(state, kind, pair).await?;
    let Some(conversation) = conversation else {
        return Ok(Vec::new());
    };

    let messages = Messages::find()
        .filter(MsgCol::ConversationId.eq(conversation.id))
        .order_by_asc(MsgCol::CreatedAt)
        .order_by_asc(MsgCol::Id)
        .all(&state.orm)
        .await?;
    Ok(messages)
}

async fn find_conversation(
    state: &AppState,
    kind: ConversationKind,
    pair: ParticipantPair,
) -> AppResult<Option<ConversationModel>> {
    let conversation = Conversations::find()
        .filter(
            Condition::all()
                .add(ConvCol::Kind.eq(kind.as_str()))
                .add(ConvCol::ParticipantLow.eq(pair.low()))
                .add(ConvCol::ParticipantHigh.eq(pair.high())),
        )
        .one(&state.orm)
        .await?;
    Ok(conversation)
}

#[derive(Debug, FromRow)]
pub(crate) struct PartnerRow {
    conversation_id: Uuid,
    last_message_at: DateTime<Utc>,
    partner_id: Uuid,
    name: String,
    email: String,
    image: Option<String>,
    bio: Option<String>,
    university: Option<String>,
    message_id: Option<Uuid>,
    body: Option<String>,
    is_image: Option<bool>,
    caption: Option<String>,
    is_read: Option<bool>,
    sender_id: Option<Uuid>,
    receiver_id: Option<Uuid>,
    message_created_at: Option<DateTime<Utc>>,
    unread_count: i64,
}

/// Everyone `user_id` has a thread with, most recent activity first.
///
/// The inner join on `users` drops threads whose partner account is gone.
pub async fn list_partners(
    state: &AppState,
    user: &AuthUser,
    kind: ConversationKind,
    user_id: Uuid,
) -> AppResult<ApiResponse<PartnerList>> {
    ensure_self_or_admin(user, user_id)?;

    let rows = sqlx::query_as::<_, PartnerRow>(
        r#"
        SELECT c.id AS conversation_id, c.last_message_at,
               u.id AS partner_id, u.name, u.email, u.image, u.bio, u.university,
               m.id AS message_id, m.body, m.is_image, m.caption, m.is_read,
               m.sender_id, m.receiver_id, m.created_at AS message_created_at,
               (SELECT COUNT(*) FROM messages um
                 WHERE um.conversation_id = c.id
                   AND um.receiver_id = $1
                   AND um.is_read = FALSE) AS unread_count
        FROM conversations c
        JOIN users u
          ON u.id = CASE WHEN c.participant_low = $1
                         THEN c.participant_high
                         ELSE c.participant_low END
        LEFT JOIN LATERAL (
            SELECT lm.* FROM messages lm
            WHERE lm.conversation_id = c.id
            ORDER BY lm.created_at DESC, lm.id DESC
            LIMIT 1
        ) m ON TRUE
        WHERE c.kind = $2
          AND (c.participant_low = $1 OR c.participant_high = $1)
        ORDER BY c.last_message_at DESC, c.id
        "#,
    )
    .bind(user_id)
    .bind(kind.as_str())
    .fetch_all(&state.pool)
    .await?;

    let items: Vec<PartnerSummary> = rows.into_iter().map(partner_from_row).collect();
    let meta = Meta::total(items.len());
    Ok(ApiResponse::success("Conversation partners", PartnerList { items }, Some(meta)))
}

pub async fn mark_read(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Message>> {
    let message = Messages::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Message"))?;

    if message.receiver_id != user.user_id && !user.is_admin() {
        return Err(AppError::Forbidden);
    }

    let message = if message.is_read {
        message
    } else {
        let mut active: MessageActive = message.into();
        active.is_read = Set(true);
        active.read_at = Set(Some(Utc::now().into()));
        active.update(&state.orm).await?
    };

    Ok(ApiResponse::success(
        "Message marked as read",
        message_from_entity(message, None)?,
        Some(Meta::empty()),
    ))
}

fn partner_from_row(row: PartnerRow) -> PartnerSummary {
    let last_message = match (
        row.message_id,
        row.body,
        row.sender_id,
        row.receiver_id,
        row.message_created_at,
    ) {
        (Some(id), Some(body), Some(sender_id), Some(receiver_id), Some(created_at)) => {
            Some(LastMessage {
                id,
                body,
                is_image: row.is_image.unwrap_or(false),
                caption: row.caption,
                is_read: row.is_read.unwrap_or(false),
                sender_id,
                receiver_id,
                created_at,
            })
        }
        _ => None,
    };

    PartnerSummary {
        partner: SellerSummary {
            id: row.partner_id,
            name: row.name,
            email: row.email,
            image: row.image,
            bio: row.bio,
            university: row.university,
        },
        conversation_id: row.conversation_id,
        last_message,
        unread_count: row.unread_count,
        last_activity_at: row.last_message_at,
    }
}

/// `seller_id` is only known for buyer and seller threads.
pub fn message_from_entity(model: MessageModel, seller_id: Option<Uuid>) -> AppResult<Message> {
    Ok(Message {
        id: model.id,
        conversation_id: model.conversation_id,
        kind: model.kind.parse()?,
        sender_id: model.sender_id,
        receiver_id: model.receiver_id,
        body: model.body,
        is_image: model.is_image,
        caption: model.caption,
        is_read: model.is_read,
        read_at: model.read_at.map(|dt| dt.with_timezone(&Utc)),
        reply_to: model.reply_to,
        sender_is_seller: seller_id.map(|s| s == model.sender_id),
        created_at: model.created_at.with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(with_message: bool) -> PartnerRow {
        let now = Utc::now();
        PartnerRow {
            conversation_id: Uuid::new_v4(),
            last_message_at: now,
            partner_id: Uuid::new_v4(),
            name: "Abebe".into(),
            email: "abebe@example.com".into(),
            image: None,
            bio: None,
            university: Some("AAU".into()),
            message_id: with_message.then(Uuid::new_v4),
            body: with_message.then(|| "hello".to_string()),
            is_image: with_message.then_some(false),
            caption: None,
            is_read: with_message.then_some(false),
            sender_id: with_message.then(Uuid::new_v4),
            receiver_id: with_message.then(Uuid::new_v4),
            message_created_at: with_message.then_some(now),
            unread_count: 3,
        }
    }

    #[test]
    fn partner_summary_carries_last_message() {
        let summary = partner_from_row(row(true));
        let last = summary.last_message.expect("last message");
        assert_eq!(last.body, "hello");
        assert_eq!(summary.unread_count, 3);
        assert_eq!(summary.partner.university.as_deref(), Some("AAU"));
    }

    #[test]
    fn partner_summary_without_messages_has_no_preview() {
        let summary = partner_from_row(row(false));
        assert!(summary.last_message.is_none());
    }

    #[test]
    fn sender_is_seller_only_reported_for_product_threads() {
        let seller = Uuid::new_v4();
        let model = MessageModel {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            kind: "product".into(),
            sender_id: seller,
            receiver_id: Uuid::new_v4(),
            body: "still available?".into(),
            is_image: false,
            caption: None,
            is_read: false,
            read_at: None,
            reply_to: None,
            created_at: Utc::now().into(),
        };
        let with_role = message_from_entity(model.clone(), Some(seller)).unwrap();
        assert_eq!(with_role.sender_is_seller, Some(true));
        assert_eq!(with_role.kind, ConversationKind::Product);

        let without_role = message_from_entity(model, None).unwrap();
        assert_eq!(without_role.sender_is_seller, None);
    }
}
