pub mod account_entries;
pub mod accounts;
pub mod audit_logs;
pub mod conversations;
pub mod messages;
pub mod order_items;
pub mod orders;
pub mod product_comments;
pub mod products;
pub mod users;

pub use account_entries::Entity as AccountEntries;
pub use accounts::Entity as Accounts;
pub use audit_logs::Entity as AuditLogs;
pub use conversations::Entity as Conversations;
pub use messages::Entity as Messages;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use product_comments::Entity as ProductComments;
pub use products::Entity as Products;
pub use users::Entity as Users;
