use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest, UpdateProfileForm},
        messages::{
            GetMessagesRequest, MessageList, PartnerList, ProductSendMessageForm, SendMessageForm,
        },
        orders::{
            CancelItemRequest, CreateOrderForm, OrderLineRequest, OrderList, OrderWithItems,
            UpdateStatusRequest,
        },
        products::{
            AddCommentRequest, CreateProductForm, ProductDetail, ProductList, UpdateProductForm,
        },
    },
    models::{
        Account, AccountEntry, ConversationKind, DeliveryMethod, EntryType, ItemStatus,
        LastMessage, Message, Order, OrderItem, OrderStatus, PartnerSummary, Product,
        ProductComment, SellerSummary, User,
    },
    response::{ApiResponse, Meta},
    routes::{accounts, auth, health, messages, orders, params, products, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        users::get_me,
        users::update_me,
        products::list_products,
        products::search_products,
        products::get_product,
        products::list_by_seller,
        products::create_product,
        products::update_product,
        products::delete_product,
        products::add_comment,
        orders::create_order,
        orders::buyer_orders,
        orders::seller_orders,
        orders::get_order,
        orders::update_status,
        orders::cancel_item,
        messages::send_message,
        messages::get_messages,
        messages::conversation_partners,
        messages::mark_read,
        messages::send_product_message,
        messages::get_product_messages,
        messages::product_partners,
        accounts::my_account
    ),
    components(
        schemas(
            User,
            Product,
            ProductComment,
            SellerSummary,
            DeliveryMethod,
            Order,
            OrderItem,
            OrderStatus,
            ItemStatus,
            Message,
            LastMessage,
            PartnerSummary,
            ConversationKind,
            Account,
            AccountEntry,
            EntryType,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            UpdateProfileForm,
            CreateProductForm,
            UpdateProductForm,
            AddCommentRequest,
            ProductDetail,
            ProductList,
            OrderLineRequest,
            CreateOrderForm,
            UpdateStatusRequest,
            CancelItemRequest,
            OrderWithItems,
            OrderList,
            SendMessageForm,
            ProductSendMessageForm,
            GetMessagesRequest,
            MessageList,
            PartnerList,
            params::Pagination,
            params::ProductQuery,
            params::SearchQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<Message>,
            ApiResponse<Account>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration and login"),
        (name = "Users", description = "Profile endpoints"),
        (name = "Products", description = "Product catalog"),
        (name = "Orders", description = "Orders and item fulfillment"),
        (name = "Messages", description = "User to user chat"),
        (name = "Product messages", description = "Buyer and seller chat"),
        (name = "Accounts", description = "Seller balances"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
