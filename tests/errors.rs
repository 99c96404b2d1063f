use axum::{http::StatusCode, response::IntoResponse};
use campus_market_api::{error::AppError, upload::UploadError};

#[test]
fn domain_errors_map_to_statuses() {
    let cases = [
        (AppError::not_found("Order"), StatusCode::NOT_FOUND),
        (AppError::BadRequest("quantity".into()), StatusCode::BAD_REQUEST),
        (AppError::Unauthorized("token".into()), StatusCode::UNAUTHORIZED),
        (AppError::Forbidden, StatusCode::FORBIDDEN),
        (AppError::Conflict("delivered".into()), StatusCode::CONFLICT),
        (AppError::Upstream("host down".into()), StatusCode::BAD_GATEWAY),
        (
            AppError::Internal(anyhow::anyhow!("boom")),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (err, status) in cases {
        assert_eq!(err.status(), status, "{err}");
        assert_eq!(err.into_response().status(), status);
    }
}

#[test]
fn invalid_uploads_are_client_errors() {
    let err: AppError = UploadError::Invalid("Unsupported file format 'exe'".into()).into();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err: AppError = UploadError::NotConfigured.into();
    assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
}

#[test]
fn not_found_names_the_resource() {
    assert_eq!(AppError::not_found("Product").to_string(), "Product not found");
}
