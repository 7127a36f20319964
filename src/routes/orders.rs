use std::collections::HashMap;

use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use diesel::{
    ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper,
    dsl::{count_star, sum},
};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    app_error::{AppError, FieldErrors, StdResponse},
    app_state::AppState,
    domain::{
        addresses::format_shipping_address,
        dashboard::OrderTotals,
        orders::{CheckoutLine, OrderStatus, snapshot_cart},
        role::Role,
    },
    extract::Json,
    middleware::{self, AuthUser},
    models::{
        AddressEntity, CartItemEntity, CreateOrderEntity, CreateOrderItemEntity, OrderEntity,
        OrderItemEntity, OrderItemRes, OrderRes, ProductEntity,
    },
    schema::{addresses, cart_items, order_items, orders, products},
};

/// Order placement and role-scoped order history.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/orders",
        OpenApiRouter::new()
            .routes(routes!(get_orders, place_order))
            .routes(routes!(get_order))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authorization,
            )),
    )
}

#[derive(Deserialize, ToSchema, Debug, Default)]
pub struct PlaceOrderReq {
    pub shipping_address: Option<String>,
}

/// Ids of orders that contain at least one product created by the shopkeeper.
async fn shopkeeper_order_ids(
    conn: &mut AsyncPgConnection,
    shopkeeper_id: i32,
) -> Result<Vec<i32>, AppError> {
    let ids: Vec<i32> = order_items::table
        .inner_join(products::table)
        .filter(products::created_by.eq(shopkeeper_id))
        .select(order_items::order_id)
        .distinct()
        .load(conn)
        .await
        .context("Failed to get shopkeeper order ids")?;

    Ok(ids)
}

/// Orders the caller may read, newest first. Customers see their own orders,
/// shopkeepers see every order that contains one of their products.
pub async fn visible_orders(
    conn: &mut AsyncPgConnection,
    user: AuthUser,
    order_id: Option<i32>,
    limit: Option<i64>,
) -> Result<Vec<OrderEntity>, AppError> {
    let mut query = orders::table
        .select(OrderEntity::as_select())
        .order_by(orders::created_at.desc())
        .then_order_by(orders::id.desc())
        .into_boxed();

    query = match user.role {
        Role::Customer => query.filter(orders::user_id.eq(user.id)),
        Role::Shopkeeper => {
            let ids = shopkeeper_order_ids(conn, user.id).await?;
            query.filter(orders::id.eq_any(ids))
        }
    };

    if let Some(order_id) = order_id {
        query = query.filter(orders::id.eq(order_id));
    }
    if let Some(limit) = limit {
        query = query.limit(limit);
    }

    let orders: Vec<OrderEntity> = query
        .load(conn)
        .await
        .context("Failed to get orders")?;

    Ok(orders)
}

/// Sum and count of the orders visible to the caller, computed by the database.
pub async fn visible_order_totals(
    conn: &mut AsyncPgConnection,
    user: AuthUser,
) -> Result<OrderTotals, AppError> {
    let (sum, count): (Option<Decimal>, i64) = match user.role {
        Role::Customer => {
            orders::table
                .filter(orders::user_id.eq(user.id))
                .select((sum(orders::total_amount), count_star()))
                .first(conn)
                .await
        }
        Role::Shopkeeper => {
            let ids = shopkeeper_order_ids(conn, user.id).await?;
            orders::table
                .filter(orders::id.eq_any(ids))
                .select((sum(orders::total_amount), count_star()))
                .first(conn)
                .await
        }
    }
    .context("Failed to total orders")?;

    Ok(OrderTotals::from_aggregate(sum, count))
}

/// Attaches the captured items to each order, keeping the order of `orders`.
pub async fn with_items(
    conn: &mut AsyncPgConnection,
    orders: Vec<OrderEntity>,
) -> Result<Vec<OrderRes>, AppError> {
    let order_ids: Vec<i32> = orders.iter().map(|order| order.id).collect();

    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq_any(&order_ids))
        .order_by(order_items::id.asc())
        .select(OrderItemEntity::as_select())
        .load(conn)
        .await
        .context("Failed to get order items")?;

    let mut group: HashMap<i32, Vec<OrderItemEntity>> = HashMap::new();
    for item in items {
        group.entry(item.order_id).or_default().push(item);
    }

    Ok(orders
        .into_iter()
        .map(|order| {
            let items = group
                .remove(&order.id)
                .unwrap_or_default()
                .into_iter()
                .map(OrderItemRes::from)
                .collect();
            OrderRes { order, items }
        })
        .collect())
}

/// List the orders visible to the caller, newest first, items nested.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Orders visible to the caller", body = StdResponse<Vec<OrderRes>, String>)
    )
)]
async fn get_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let orders = visible_orders(conn, user, None, None).await?;
    let orders = with_items(conn, orders).await?;

    Ok(StdResponse {
        data: Some(orders),
        message: Some("Get orders successfully"),
    })
}

/// Fetch one order visible to the caller.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to fetch")
    ),
    responses(
        (status = 200, description = "Get order successfully", body = StdResponse<OrderRes, String>),
        (status = 404, description = "Order does not exist or is not visible to the caller")
    )
)]
async fn get_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let orders = visible_orders(conn, user, Some(id), None).await?;
    let order = with_items(conn, orders)
        .await?
        .into_iter()
        .next()
        .ok_or(AppError::NotFound)?;

    Ok(StdResponse {
        data: Some(order),
        message: Some("Get order successfully"),
    })
}

/// Turn the caller's cart into an order.
///
/// Runs in one transaction: the cart lines and their products are locked, prices and
/// names are captured into order items, stock is decremented and the cart is emptied.
/// Any failure leaves the cart untouched.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    request_body = PlaceOrderReq,
    responses(
        (status = 201, description = "Order placed", body = StdResponse<OrderRes, String>),
        (status = 400, description = "Empty cart, missing shipping address or insufficient stock")
    )
)]
async fn place_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<PlaceOrderReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user_id = user.id;
    let shipping_address = body
        .shipping_address
        .map(|address| address.trim().to_string())
        .filter(|address| !address.is_empty());

    let order = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let rows: Vec<(CartItemEntity, ProductEntity)> = cart_items::table
                    .inner_join(products::table)
                    .filter(cart_items::user_id.eq(user_id))
                    .order_by(cart_items::id.asc())
                    .select((CartItemEntity::as_select(), ProductEntity::as_select()))
                    .for_update()
                    .load(conn)
                    .await
                    .context("Failed to lock cart")?;

                let lines: Vec<CheckoutLine> = rows
                    .into_iter()
                    .map(|(item, product)| CheckoutLine {
                        cart_item_id: item.id,
                        product_id: product.id,
                        product_name: product.name,
                        unit_price: product.price,
                        stock: product.stock,
                        quantity: item.quantity,
                    })
                    .collect();

                let snapshot = snapshot_cart(&lines)?;

                let shipping_address = match shipping_address {
                    Some(address) => address,
                    None => {
                        let default_address: Option<AddressEntity> = addresses::table
                            .filter(addresses::user_id.eq(user_id))
                            .filter(addresses::is_default.eq(true))
                            .select(AddressEntity::as_select())
                            .first(conn)
                            .await
                            .optional()
                            .context("Failed to get default address")?;

                        let address = default_address.ok_or_else(|| {
                            AppError::Validation(FieldErrors::single(
                                "shipping_address",
                                "This field is required.",
                            ))
                        })?;

                        format_shipping_address(
                            &address.street_address,
                            &address.city,
                            &address.state,
                            &address.postal_code,
                        )
                    }
                };

                let order: OrderEntity = diesel::insert_into(orders::table)
                    .values(CreateOrderEntity {
                        user_id,
                        status: OrderStatus::Created,
                        total_amount: snapshot.total_amount,
                        shipping_address,
                    })
                    .returning(OrderEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create order")?;

                let new_items: Vec<CreateOrderItemEntity> = snapshot
                    .items
                    .iter()
                    .map(|item| CreateOrderItemEntity {
                        order_id: order.id,
                        product_id: Some(item.product_id),
                        quantity: item.quantity,
                        price: item.price,
                        product_name: item.product_name.clone(),
                    })
                    .collect();

                let items: Vec<OrderItemEntity> = diesel::insert_into(order_items::table)
                    .values(&new_items)
                    .returning(OrderItemEntity::as_returning())
                    .get_results(conn)
                    .await
                    .context("Failed to create order items")?;

                for item in &snapshot.items {
                    diesel::update(products::table.find(item.product_id))
                        .set(products::stock.eq(products::stock - item.quantity))
                        .execute(conn)
                        .await
                        .context("Failed to update stock")?;
                }

                let cart_item_ids: Vec<i32> = lines.iter().map(|line| line.cart_item_id).collect();
                diesel::delete(cart_items::table.filter(cart_items::id.eq_any(&cart_item_ids)))
                    .execute(conn)
                    .await
                    .context("Failed to clear cart")?;

                Ok::<OrderRes, AppError>(OrderRes {
                    order,
                    items: items.into_iter().map(OrderItemRes::from).collect(),
                })
            })
        })
        .await?;

    info!(
        user_id,
        order_id = order.order.id,
        total_amount = %order.order.total_amount,
        items = order.items.len(),
        "Order placed"
    );

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(order),
            message: Some("Order placed successfully"),
        },
    ))
}
