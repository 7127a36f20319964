use anyhow::Context;
use axum::{Extension, extract::State, response::IntoResponse};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    domain::{cart::cart_total, dashboard::RECENT_ORDERS_LIMIT, role::Role},
    middleware::{self, AuthUser},
    models::{CartLine, OrderRes, ProductEntity},
    routes::{
        cart::load_cart_lines,
        orders::{visible_order_totals, visible_orders, with_items},
    },
    schema::products,
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(get_dashboard))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::authorization,
        ))
}

#[derive(Serialize, ToSchema)]
pub struct ShopkeeperDashboard {
    pub role: Role,
    #[schema(value_type = String, example = "120.00")]
    pub total_sales: Decimal,
    pub total_products: usize,
    pub recent_orders: Vec<OrderRes>,
    pub products: Vec<ProductEntity>,
}

#[derive(Serialize, ToSchema)]
pub struct CustomerDashboard {
    pub role: Role,
    pub total_orders: i64,
    #[schema(value_type = String, example = "50.00")]
    pub cart_total: Decimal,
    pub recent_orders: Vec<OrderRes>,
    pub cart_items: Vec<CartLine>,
}

#[derive(Serialize, ToSchema)]
#[serde(untagged)]
pub enum DashboardRes {
    Shopkeeper(ShopkeeperDashboard),
    Customer(CustomerDashboard),
}

async fn shopkeeper_dashboard(
    conn: &mut AsyncPgConnection,
    user: AuthUser,
) -> Result<ShopkeeperDashboard, AppError> {
    let sales = visible_order_totals(conn, user).await?;
    let recent = visible_orders(conn, user, None, Some(RECENT_ORDERS_LIMIT)).await?;

    let products: Vec<ProductEntity> = products::table
        .filter(products::created_by.eq(user.id))
        .order_by(products::created_at.desc())
        .select(ProductEntity::as_select())
        .load(conn)
        .await
        .context("Failed to get products")?;

    Ok(ShopkeeperDashboard {
        role: user.role,
        total_sales: sales.total_amount,
        total_products: products.len(),
        recent_orders: with_items(conn, recent).await?,
        products,
    })
}

async fn customer_dashboard(
    conn: &mut AsyncPgConnection,
    user: AuthUser,
) -> Result<CustomerDashboard, AppError> {
    let history = visible_order_totals(conn, user).await?;
    let recent = visible_orders(conn, user, None, Some(RECENT_ORDERS_LIMIT)).await?;

    let cart_items = load_cart_lines(conn, user.id).await?;

    Ok(CustomerDashboard {
        role: user.role,
        total_orders: history.count,
        cart_total: cart_total(cart_items.iter().map(|line| (line.quantity, line.product.price))),
        recent_orders: with_items(conn, recent).await?,
        cart_items,
    })
}

/// Role-shaped summary for the caller. Read-only.
#[utoipa::path(
    get,
    path = "/dashboard",
    tags = ["Dashboard"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Dashboard of the caller", body = StdResponse<DashboardRes, String>)
    )
)]
async fn get_dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let dashboard = match user.role {
        Role::Shopkeeper => DashboardRes::Shopkeeper(shopkeeper_dashboard(conn, user).await?),
        Role::Customer => DashboardRes::Customer(customer_dashboard(conn, user).await?),
    };

    Ok(StdResponse {
        data: Some(dashboard),
        message: Some("Get dashboard successfully"),
    })
}
