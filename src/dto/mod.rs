pub mod auth;
pub mod messages;
pub mod orders;
pub mod products;
