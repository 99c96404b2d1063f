use axum::Router;

use crate::state::AppState;

pub mod accounts;
pub mod auth;
pub mod doc;
pub mod form;
pub mod health;
pub mod messages;
pub mod orders;
pub mod params;
pub mod products;
pub mod users;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/products", products::router())
        .nest("/orders", orders::route())
        .nest("/messages", messages::router())
        .nest("/product-messages", messages::product_router())
        .nest("/accounts", accounts::router())
}
