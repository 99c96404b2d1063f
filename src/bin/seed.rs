use campus_market_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::{
        products::{ActiveModel as ProductActive, Column as ProductCol, Entity as Products},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    },
    models::{DeliveryMethod, ROLE_ADMIN, ROLE_USER},
    services::auth_service::hash_password,
};
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&orm, "admin@example.com", "admin123", "Admin", ROLE_ADMIN).await?;
    let seller_id = ensure_user(&orm, "seller@example.com", "seller123", "Sara Seller", ROLE_USER).await?;
    let buyer_id = ensure_user(&orm, "buyer@example.com", "buyer123", "Bruk Buyer", ROLE_USER).await?;
    seed_products(&orm, seller_id).await?;

    println!("Seed completed. Admin: {admin_id}, seller: {seller_id}, buyer: {buyer_id}");
    Ok(())
}

async fn ensure_user(
    orm: &DatabaseConnection,
    email: &str,
    password: &str,
    name: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    Users::insert(UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set(password_hash),
        role: Set(role.to_string()),
        name: Set(name.to_string()),
        image: Set(None),
        bio: Set(None),
        university: Set(Some("Addis Ababa University".to_string())),
        created_at: Set(Utc::now().into()),
    })
    .on_conflict(
        OnConflict::column(UserCol::Email)
            .update_column(UserCol::Role)
            .to_owned(),
    )
    .exec_without_returning(orm)
    .await?;

    let user = Users::find()
        .filter(UserCol::Email.eq(email))
        .one(orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("user {email} missing after upsert"))?;

    println!("Ensured user {email} (role={role})");
    Ok(user.id)
}

async fn seed_products(orm: &DatabaseConnection, seller_id: Uuid) -> anyhow::Result<()> {
    let existing = Products::find()
        .filter(ProductCol::SellerId.eq(seller_id))
        .count(orm)
        .await?;
    if existing > 0 {
        println!("Seller already has {existing} products, skipping");
        return Ok(());
    }

    let products = [
        ("Calculus: Early Transcendentals", "8th edition, a few notes in pencil", 120_000, 10, 3, "books", DeliveryMethod::Pickup, vec!["math", "textbook"]),
        ("Desk lamp", "LED lamp with three brightness levels", 65_000, 0, 5, "home", DeliveryMethod::Both, vec!["dorm", "lighting"]),
        ("Graphing calculator", "TI-84 Plus, works perfectly", 250_000, 15, 1, "electronics", DeliveryMethod::Delivery, vec!["math", "exam"]),
        ("Lab coat", "Size M, worn for one semester", 40_000, 0, 4, "clothing", DeliveryMethod::Pickup, vec!["chemistry", "lab"]),
    ];

    for (name, description, price, discount, stock, category, method, tags) in products {
        let now = Utc::now();
        ProductActive {
            id: Set(Uuid::new_v4()),
            seller_id: Set(seller_id),
            name: Set(name.to_string()),
            description: Set(description.to_string()),
            price: Set(price),
            discount: Set(discount),
            stock: Set(stock),
            category: Set(category.to_string()),
            delivery_method: Set(method.as_str().to_string()),
            images: Set(vec![format!("https://placehold.co/600x400?text={}", category)]),
            tags: Set(tags.into_iter().map(str::to_string).collect()),
            is_active: Set(true),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(orm)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
