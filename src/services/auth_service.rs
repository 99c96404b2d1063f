use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use uuid::Uuid;

use crate::{
    audit,
    dto::auth::{Claims, LoginRequest, LoginResponse, RegisterRequest, UpdateProfileRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{ROLE_USER, User},
    response::{ApiResponse, Meta},
    state::AppState,
    upload::{UploadedFile, validate_image},
};

const MIN_PASSWORD_LEN: usize = 6;
const TOKEN_TTL_HOURS: i64 = 24;

const USER_COLUMNS: &str =
    "id, email, password_hash, role, name, image, bio, university, created_at";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    role: String,
    name: String,
    image: Option<String>,
    bio: Option<String>,
    university: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            name: row.name,
            role: row.role,
            image: row.image,
            bio: row.bio,
            university: row.university,
            created_at: row.created_at,
        }
    }
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    let RegisterRequest {
        email,
        password,
        name,
        university,
    } = payload;
    let email = email.trim().to_lowercase();
    let name = name.trim().to_string();

    if !email.contains('@') {
        return Err(AppError::BadRequest("A valid email is required".into()));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }

    let exist: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(email.as_str())
        .fetch_optional(&state.pool)
        .await?;

    if exist.is_some() {
        return Err(AppError::BadRequest("Email is already taken".to_string()));
    }

    let password_hash = hash_password(&password)?;

    let row: UserRow = sqlx::query_as(&format!(
        "INSERT INTO users (id, email, password_hash, role, name, university, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, NOW()) RETURNING {USER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(email.as_str())
    .bind(password_hash)
    .bind(ROLE_USER)
    .bind(name)
    .bind(university.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()))
    .fetch_one(&state.pool)
    .await?;
    let user = User::from(row);

    audit::record(
        &state.pool,
        user.id,
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success("User created", user, None))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest { email, password } = payload;
    let row: Option<UserRow> = sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
    ))
    .bind(email.trim().to_lowercase())
    .fetch_optional(&state.pool)
    .await?;

    let row = match row {
        Some(u) => u,
        None => return Err(AppError::BadRequest("Invalid email or password".into())),
    };

    let parsed_hash = PasswordHash::new(&row.password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(AppError::BadRequest("Invalid email or password".into()));
    }

    let token = issue_token(row.id, &row.role, &state.config.jwt_secret)?;
    let user = User::from(row);

    audit::record(
        &state.pool,
        user.id,
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Logged in",
        LoginResponse { token, user },
        Some(Meta::empty()),
    ))
}

pub async fn me(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let row: Option<UserRow> =
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user.user_id)
            .fetch_optional(&state.pool)
            .await?;
    let row = row.ok_or_else(|| AppError::not_found("User"))?;

    Ok(ApiResponse::success("Profile", User::from(row), Some(Meta::empty())))
}

/// Absent fields are left unchanged. A new image replaces the old one.
pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
    image: Option<UploadedFile>,
) -> AppResult<ApiResponse<User>> {
    let name = payload.name.map(|n| n.trim().to_string());
    if name.as_deref().is_some_and(str::is_empty) {
        return Err(AppError::BadRequest("Name cannot be empty".into()));
    }

    let image_url = match image {
        Some(file) => {
            validate_image(&file, state.config.max_upload_bytes)?;
            Some(state.images.upload(file).await?)
        }
        None => None,
    };

    let row: Option<UserRow> = sqlx::query_as(&format!(
        r#"
        UPDATE users
        SET name = COALESCE($2, name),
            bio = COALESCE($3, bio),
            university = COALESCE($4, university),
            image = COALESCE($5, image)
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(user.user_id)
    .bind(name)
    .bind(payload.bio.map(|b| b.trim().to_string()))
    .bind(payload.university.map(|u| u.trim().to_string()))
    .bind(image_url)
    .fetch_optional(&state.pool)
    .await?;
    let row = row.ok_or_else(|| AppError::not_found("User"))?;

    audit::record(
        &state.pool,
        user.user_id,
        "profile_update",
        "users",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;

    Ok(ApiResponse::success("Profile updated", User::from(row), Some(Meta::empty())))
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

/// HS256 token carrying the user id and role, valid for 24 hours.
pub fn issue_token(user_id: Uuid, role: &str, secret: &str) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(TOKEN_TTL_HOURS))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::decode_token;

    #[test]
    fn issued_token_decodes_to_same_user() {
        let id = Uuid::new_v4();
        let token = issue_token(id, "admin", "secret").unwrap();
        let user = decode_token(&token, "secret").unwrap();
        assert_eq!(user.user_id, id);
        assert!(user.is_admin());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = issue_token(Uuid::new_v4(), ROLE_USER, "secret").unwrap();
        assert!(matches!(
            decode_token(&token, "other"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("hunter22").unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(Argon2::default().verify_password(b"hunter22", &parsed).is_ok());
        assert!(Argon2::default().verify_password(b"wrong", &parsed).is_err());
    }
}
