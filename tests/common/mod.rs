#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use campus_market_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    dto::products::CreateProductRequest,
    entity::users::ActiveModel as UserActive,
    middleware::auth::AuthUser,
    models::{DeliveryMethod, Product, ROLE_USER},
    services::product_service,
    state::AppState,
    upload::{ImageHost, UploadError, UploadedFile},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

/// Image host that never leaves the process.
pub struct StubHost;

#[async_trait]
impl ImageHost for StubHost {
    async fn upload(&self, file: UploadedFile) -> Result<String, UploadError> {
        Ok(format!("https://img.test/{}/{}", Uuid::new_v4(), file.file_name))
    }
}

/// `None` when no database is configured; callers skip.
pub async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests.");
            return Ok(None);
        }
    };

    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;

    let config = AppConfig {
        database_url,
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: "test-secret".into(),
        request_timeout_secs: 30,
        max_upload_bytes: 1024 * 1024,
        cloudinary: None,
    };
    Ok(Some(AppState::new(orm, Arc::new(StubHost), config)))
}

/// Creates a user with a unique email so tests can share one database.
pub async fn create_user(state: &AppState, name: &str) -> anyhow::Result<AuthUser> {
    let id = Uuid::new_v4();
    UserActive {
        id: Set(id),
        email: Set(format!("{}-{}@campus.test", name.to_lowercase(), id)),
        password_hash: Set("not-a-real-hash".into()),
        role: Set(ROLE_USER.into()),
        name: Set(name.into()),
        image: Set(None),
        bio: Set(None),
        university: Set(Some("Test University".into())),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: id,
        role: ROLE_USER.into(),
    })
}

pub fn image(name: &str) -> UploadedFile {
    UploadedFile {
        field: "images".into(),
        file_name: name.into(),
        content_type: Some("image/png".into()),
        bytes: vec![0x89, 0x50, 0x4e, 0x47],
    }
}

pub async fn create_product(
    state: &AppState,
    seller: &AuthUser,
    name: &str,
    price: i64,
    discount: i32,
    stock: i32,
    tags: Vec<String>,
) -> anyhow::Result<Product> {
    let resp = product_service::create_product(
        state,
        seller,
        CreateProductRequest {
            name: name.into(),
            description: format!("{name} in good condition"),
            price,
            discount,
            stock,
            category: "misc".into(),
            delivery_method: DeliveryMethod::Both,
            tags,
        },
        vec![image("front.png")],
    )
    .await?;
    Ok(resp.into_data().expect("product"))
}
