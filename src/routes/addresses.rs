use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tracing::info;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    domain::addresses::{AddressForm, validate_address},
    extract::Json,
    middleware::{self, AuthUser},
    models::{AddressEntity, CreateAddressEntity, UpdateAddressEntity},
    schema::{addresses, customer_profiles, users},
};

/// Address book of the caller.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/addresses",
        OpenApiRouter::new()
            .routes(routes!(get_addresses, create_address))
            .routes(routes!(get_address, update_address, delete_address))
            .routes(routes!(set_default))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authorization,
            )),
    )
}

/// Serialises default-flag changes for one user by locking their account row.
async fn lock_address_book(conn: &mut AsyncPgConnection, user_id: i32) -> Result<(), AppError> {
    users::table
        .find(user_id)
        .select(users::id)
        .for_update()
        .first::<i32>(conn)
        .await?;
    Ok(())
}

/// Clears the default flag on every address of the user except `keep`.
async fn clear_defaults(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    keep: Option<i32>,
) -> Result<(), AppError> {
    let defaults = addresses::table
        .filter(addresses::user_id.eq(user_id))
        .filter(addresses::is_default.eq(true));
    let cleared = (
        addresses::is_default.eq(false),
        addresses::updated_at.eq(Utc::now()),
    );

    match keep {
        Some(keep) => {
            diesel::update(defaults.filter(addresses::id.ne(keep)))
                .set(cleared)
                .execute(conn)
                .await
        }
        None => diesel::update(defaults).set(cleared).execute(conn).await,
    }
    .context("Failed to clear default address")?;

    Ok(())
}

async fn find_owned(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    id: i32,
) -> Result<AddressEntity, AppError> {
    let address: AddressEntity = addresses::table
        .find(id)
        .filter(addresses::user_id.eq(user_id))
        .select(AddressEntity::as_select())
        .first(conn)
        .await?;
    Ok(address)
}

/// List the caller's addresses, default first.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Addresses"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Addresses of the caller", body = StdResponse<Vec<AddressEntity>, String>)
    )
)]
async fn get_addresses(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let addresses: Vec<AddressEntity> = addresses::table
        .filter(addresses::user_id.eq(user.id))
        .order_by((addresses::is_default.desc(), addresses::created_at.desc()))
        .select(AddressEntity::as_select())
        .load(conn)
        .await
        .context("Failed to get addresses")?;

    Ok(StdResponse {
        data: Some(addresses),
        message: Some("Get addresses successfully"),
    })
}

/// Add an address. When flagged as default, the previous default is cleared.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Addresses"],
    security(("bearerAuth" = [])),
    request_body = AddressForm,
    responses(
        (status = 201, description = "Address created", body = StdResponse<AddressEntity, String>),
        (status = 400, description = "Field errors")
    )
)]
async fn create_address(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<AddressForm>,
) -> Result<impl IntoResponse, AppError> {
    let address = validate_address(&body).map_err(AppError::Validation)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user_id = user.id;
    let address = conn
        .transaction(move |conn| {
            Box::pin(async move {
                if address.is_default {
                    lock_address_book(conn, user_id).await?;
                    clear_defaults(conn, user_id, None).await?;
                }

                let address: AddressEntity = diesel::insert_into(addresses::table)
                    .values(CreateAddressEntity {
                        user_id,
                        street_address: address.street_address,
                        city: address.city,
                        state: address.state,
                        postal_code: address.postal_code,
                        is_default: address.is_default,
                    })
                    .returning(AddressEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create address")?;

                Ok::<AddressEntity, AppError>(address)
            })
        })
        .await?;

    info!(user_id, address_id = address.id, "Address created");

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(address),
            message: Some("Address created successfully"),
        },
    ))
}

/// Fetch one of the caller's addresses.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Addresses"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Address ID")
    ),
    responses(
        (status = 200, description = "Address", body = StdResponse<AddressEntity, String>),
        (status = 404, description = "Not one of the caller's addresses")
    )
)]
async fn get_address(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let address = find_owned(conn, user.id, id).await?;

    Ok(StdResponse {
        data: Some(address),
        message: Some("Get address successfully"),
    })
}

/// Replace one of the caller's addresses.
#[utoipa::path(
    put,
    path = "/{id}",
    tags = ["Addresses"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Address ID")
    ),
    request_body = AddressForm,
    responses(
        (status = 200, description = "Address updated", body = StdResponse<AddressEntity, String>),
        (status = 400, description = "Field errors"),
        (status = 404, description = "Not one of the caller's addresses")
    )
)]
async fn update_address(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<AddressForm>,
) -> Result<impl IntoResponse, AppError> {
    let address = validate_address(&body).map_err(AppError::Validation)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user_id = user.id;
    let address = conn
        .transaction(move |conn| {
            Box::pin(async move {
                lock_address_book(conn, user_id).await?;
                find_owned(conn, user_id, id).await?;

                if address.is_default {
                    clear_defaults(conn, user_id, Some(id)).await?;
                }

                let address: AddressEntity = diesel::update(addresses::table.find(id))
                    .set(UpdateAddressEntity {
                        street_address: address.street_address,
                        city: address.city,
                        state: address.state,
                        postal_code: address.postal_code,
                        is_default: address.is_default,
                        updated_at: Utc::now(),
                    })
                    .returning(AddressEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to update address")?;

                Ok::<AddressEntity, AppError>(address)
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(address),
        message: Some("Address updated successfully"),
    })
}

/// Delete one of the caller's addresses. Profiles pointing at it lose the reference.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Addresses"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Address ID")
    ),
    responses(
        (status = 204, description = "Address deleted"),
        (status = 404, description = "Not one of the caller's addresses")
    )
)]
async fn delete_address(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted = diesel::delete(addresses::table)
        .filter(addresses::id.eq(id))
        .filter(addresses::user_id.eq(user.id))
        .execute(conn)
        .await
        .context("Failed to delete address")?;

    if deleted == 0 {
        return Err(AppError::NotFound);
    }

    info!(user_id = user.id, address_id = id, "Address deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Make an address the caller's only default and point their customer profile at it.
#[utoipa::path(
    post,
    path = "/{id}/set_default",
    tags = ["Addresses"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Address ID")
    ),
    responses(
        (status = 200, description = "Default address set", body = StdResponse<AddressEntity, String>),
        (status = 404, description = "Not one of the caller's addresses")
    )
)]
async fn set_default(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user_id = user.id;
    let address = conn
        .transaction(move |conn| {
            Box::pin(async move {
                lock_address_book(conn, user_id).await?;
                find_owned(conn, user_id, id).await?;

                clear_defaults(conn, user_id, Some(id)).await?;

                let address: AddressEntity = diesel::update(addresses::table.find(id))
                    .set((
                        addresses::is_default.eq(true),
                        addresses::updated_at.eq(Utc::now()),
                    ))
                    .returning(AddressEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to set default address")?;

                diesel::update(customer_profiles::table)
                    .filter(customer_profiles::user_id.eq(user_id))
                    .set((
                        customer_profiles::default_address_id.eq(Some(id)),
                        customer_profiles::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await
                    .context("Failed to update customer profile")?;

                Ok::<AddressEntity, AppError>(address)
            })
        })
        .await?;

    info!(user_id, address_id = id, "Default address set");

    Ok(StdResponse {
        data: Some(address),
        message: Some("Default address set successfully"),
    })
}
