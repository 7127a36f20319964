use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper, upsert::excluded};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    app_error::{AppError, FieldErrors, StdResponse},
    app_state::AppState,
    domain::cart::{
        AddToCartForm, UpdateCartItemForm, cart_total, merged_quantity, validate_add,
        validate_update,
    },
    extract::Json,
    middleware::{self, AuthUser},
    models::{CartItemEntity, CartLine, CreateCartItemEntity, ProductEntity},
    schema::{cart_items, products},
};

/// Cart routes. Every line is scoped to the caller.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/cart",
        OpenApiRouter::new()
            .routes(routes!(get_cart, add_to_cart))
            .routes(routes!(get_cart_item, update_cart_item, remove_cart_item))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authorization,
            )),
    )
}

#[derive(Serialize, ToSchema)]
pub struct CartRes {
    pub items: Vec<CartLine>,
    #[schema(value_type = String, example = "50.00")]
    pub total: Decimal,
}

/// Live cart lines of a user, newest first.
pub async fn load_cart_lines(
    conn: &mut AsyncPgConnection,
    user_id: i32,
) -> Result<Vec<CartLine>, AppError> {
    let rows: Vec<(CartItemEntity, ProductEntity)> = cart_items::table
        .inner_join(products::table)
        .filter(cart_items::user_id.eq(user_id))
        .order_by(cart_items::added_at.desc())
        .select((CartItemEntity::as_select(), ProductEntity::as_select()))
        .load(conn)
        .await
        .context("Failed to get cart items")?;

    Ok(rows
        .into_iter()
        .map(|(item, product)| CartLine::new(item, product))
        .collect())
}

async fn load_cart_line(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    id: i32,
) -> Result<CartLine, AppError> {
    let (item, product): (CartItemEntity, ProductEntity) = cart_items::table
        .inner_join(products::table)
        .filter(cart_items::id.eq(id))
        .filter(cart_items::user_id.eq(user_id))
        .select((CartItemEntity::as_select(), ProductEntity::as_select()))
        .first(conn)
        .await?;

    Ok(CartLine::new(item, product))
}

/// List the caller's cart with live line totals and the cart total.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Cart of the caller", body = StdResponse<CartRes, String>)
    )
)]
async fn get_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let items = load_cart_lines(conn, user.id).await?;
    let total = cart_total(items.iter().map(|line| (line.quantity, line.product.price)));

    Ok(StdResponse {
        data: Some(CartRes { items, total }),
        message: Some("Get cart successfully"),
    })
}

/// Add a product to the cart. Adding a product already in the cart increments its quantity.
///
/// The existing line is locked before the increment so the merged quantity stays under
/// the per-line cap. A line created concurrently merges through the upsert.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    request_body = AddToCartForm,
    responses(
        (status = 201, description = "Cart line created or incremented", body = StdResponse<CartLine, String>),
        (status = 400, description = "Field errors")
    )
)]
async fn add_to_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<AddToCartForm>,
) -> Result<impl IntoResponse, AppError> {
    let (product_id, quantity) = validate_add(&body).map_err(AppError::Validation)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user_id = user.id;
    let (item, product) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let product: ProductEntity = products::table
                    .find(product_id)
                    .select(ProductEntity::as_select())
                    .first(conn)
                    .await
                    .optional()
                    .context("Failed to get product")?
                    .ok_or_else(|| {
                        AppError::Validation(FieldErrors::single(
                            "product_id",
                            format!("Invalid pk \"{product_id}\" - object does not exist."),
                        ))
                    })?;

                let current: Option<i32> = cart_items::table
                    .filter(cart_items::user_id.eq(user_id))
                    .filter(cart_items::product_id.eq(product_id))
                    .select(cart_items::quantity)
                    .for_update()
                    .first(conn)
                    .await
                    .optional()
                    .context("Failed to get cart line")?;
                if let Some(current) = current {
                    merged_quantity(current, quantity).map_err(AppError::Validation)?;
                }

                let item: CartItemEntity = diesel::insert_into(cart_items::table)
                    .values(CreateCartItemEntity {
                        user_id,
                        product_id,
                        quantity,
                    })
                    .on_conflict((cart_items::user_id, cart_items::product_id))
                    .do_update()
                    .set(
                        cart_items::quantity
                            .eq(cart_items::quantity + excluded(cart_items::quantity)),
                    )
                    .returning(CartItemEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to add to cart")?;

                Ok::<(CartItemEntity, ProductEntity), AppError>((item, product))
            })
        })
        .await?;

    info!(
        user_id = user.id,
        product_id,
        quantity = item.quantity,
        "Added to cart"
    );

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(CartLine::new(item, product)),
            message: Some("Added to cart successfully"),
        },
    ))
}

/// Fetch one cart line of the caller.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Cart line ID")
    ),
    responses(
        (status = 200, description = "Cart line", body = StdResponse<CartLine, String>),
        (status = 404, description = "Not the caller's cart line")
    )
)]
async fn get_cart_item(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let line = load_cart_line(conn, user.id, id).await?;

    Ok(StdResponse {
        data: Some(line),
        message: Some("Get cart item successfully"),
    })
}

/// Replace the quantity of a cart line.
#[utoipa::path(
    put,
    path = "/{id}",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Cart line ID")
    ),
    request_body = UpdateCartItemForm,
    responses(
        (status = 200, description = "Updated cart line", body = StdResponse<CartLine, String>),
        (status = 400, description = "Missing or invalid quantity"),
        (status = 404, description = "Not the caller's cart line")
    )
)]
async fn update_cart_item(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<UpdateCartItemForm>,
) -> Result<impl IntoResponse, AppError> {
    let quantity = validate_update(&body).map_err(AppError::Validation)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    diesel::update(cart_items::table)
        .filter(cart_items::id.eq(id))
        .filter(cart_items::user_id.eq(user.id))
        .set(cart_items::quantity.eq(quantity))
        .returning(cart_items::id)
        .get_result::<i32>(conn)
        .await?;

    let line = load_cart_line(conn, user.id, id).await?;

    Ok(StdResponse {
        data: Some(line),
        message: Some("Updated cart item successfully"),
    })
}

/// Remove a line from the caller's cart.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Cart line ID")
    ),
    responses(
        (status = 204, description = "Removed"),
        (status = 404, description = "Not the caller's cart line")
    )
)]
async fn remove_cart_item(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted = diesel::delete(cart_items::table)
        .filter(cart_items::id.eq(id))
        .filter(cart_items::user_id.eq(user.id))
        .execute(conn)
        .await
        .context("Failed to remove cart item")?;

    if deleted == 0 {
        return Err(AppError::NotFound);
    }

    info!(user_id = user.id, cart_item_id = id, "Removed from cart");

    Ok(StatusCode::NO_CONTENT)
}
