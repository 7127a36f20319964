use chrono::{DateTime, NaiveDate, Utc};
use diesel::{
    Selectable,
    prelude::{AsChangeset, Identifiable, Insertable, Queryable},
};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{cart::line_total, orders::OrderStatus, role::Role};

// Users

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserEntity {
    pub id: i32,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::users)]
pub struct CreateUserEntity {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = crate::schema::users)]
pub struct UpdateUserEntity {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::blacklisted_tokens)]
pub struct CreateBlacklistedTokenEntity {
    pub jti: Uuid,
    pub user_id: i32,
    pub expires_at: DateTime<Utc>,
}

// Addresses

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::addresses)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AddressEntity {
    pub id: i32,
    pub user_id: i32,
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::addresses)]
pub struct CreateAddressEntity {
    pub user_id: i32,
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub is_default: bool,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = crate::schema::addresses)]
pub struct UpdateAddressEntity {
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub is_default: bool,
    pub updated_at: DateTime<Utc>,
}

// Profiles

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::customer_profiles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CustomerProfileEntity {
    pub id: i32,
    pub user_id: i32,
    pub date_of_birth: Option<NaiveDate>,
    pub profile_picture: Option<String>,
    pub bio: String,
    pub default_address_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::customer_profiles)]
pub struct CreateCustomerProfileEntity {
    pub user_id: i32,
    pub date_of_birth: Option<NaiveDate>,
    pub bio: String,
    pub default_address_id: Option<i32>,
}

/// `None` leaves a column alone, `Some(None)` clears a nullable one.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = crate::schema::customer_profiles)]
pub struct UpdateCustomerProfileEntity {
    pub date_of_birth: Option<Option<NaiveDate>>,
    pub bio: Option<String>,
    pub default_address_id: Option<Option<i32>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::shopkeeper_profiles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ShopkeeperProfileEntity {
    pub id: i32,
    pub user_id: i32,
    pub store_name: String,
    pub store_description: String,
    pub business_registration_number: String,
    pub store_logo: Option<String>,
    pub store_banner: Option<String>,
    pub store_address_id: Option<i32>,
    pub business_phone: String,
    pub business_email: String,
    pub tax_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = crate::schema::shopkeeper_profiles)]
#[diesel(treat_none_as_null = true)]
pub struct ShopkeeperProfileChanges {
    pub store_name: String,
    pub store_description: String,
    pub business_registration_number: String,
    pub store_address_id: Option<i32>,
    pub business_phone: String,
    pub business_email: String,
    pub tax_id: String,
}

// Products

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductEntity {
    pub id: i32,
    pub name: String,
    pub description: String,
    #[schema(value_type = String, example = "10.00")]
    pub price: Decimal,
    pub category: String,
    pub subcategory: String,
    pub stock: i32,
    pub image: Option<String>,
    pub created_by: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = crate::schema::products)]
pub struct ProductChanges {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category: String,
    pub subcategory: String,
    pub stock: i32,
}

// Cart

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::cart_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartItemEntity {
    pub id: i32,
    pub user_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub added_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::cart_items)]
pub struct CreateCartItemEntity {
    pub user_id: i32,
    pub product_id: i32,
    pub quantity: i32,
}

/// A cart line with its product and the live line total.
#[derive(Serialize, Debug, ToSchema)]
pub struct CartLine {
    pub id: i32,
    pub product: ProductEntity,
    pub quantity: i32,
    #[schema(value_type = String, example = "50.00")]
    pub total_price: Decimal,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    pub fn new(item: CartItemEntity, product: ProductEntity) -> Self {
        Self {
            id: item.id,
            total_price: line_total(item.quantity, product.price),
            quantity: item.quantity,
            added_at: item.added_at,
            product,
        }
    }
}

// Orders

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderEntity {
    pub id: i32,
    pub user_id: i32,
    pub status: OrderStatus,
    #[schema(value_type = String, example = "50.00")]
    pub total_amount: Decimal,
    pub shipping_address: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::orders)]
pub struct CreateOrderEntity {
    pub user_id: i32,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub shipping_address: String,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemEntity {
    pub id: i32,
    pub order_id: i32,
    pub product_id: Option<i32>,
    pub quantity: i32,
    #[schema(value_type = String, example = "10.00")]
    pub price: Decimal,
    pub product_name: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::order_items)]
pub struct CreateOrderItemEntity {
    pub order_id: i32,
    pub product_id: Option<i32>,
    pub quantity: i32,
    pub price: Decimal,
    pub product_name: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct OrderItemRes {
    #[serde(flatten)]
    pub item: OrderItemEntity,
    #[schema(value_type = String, example = "50.00")]
    pub total_price: Decimal,
}

impl From<OrderItemEntity> for OrderItemRes {
    fn from(item: OrderItemEntity) -> Self {
        Self {
            total_price: line_total(item.quantity, item.price),
            item,
        }
    }
}

/// An order with its captured items.
#[derive(Serialize, Debug, ToSchema)]
pub struct OrderRes {
    #[serde(flatten)]
    pub order: OrderEntity,
    pub items: Vec<OrderItemRes>,
}
