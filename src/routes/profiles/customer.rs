use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::info;
use utoipa_axum::{router::OpenApiRouter, routes};

use super::{check_own_address, profile_exists, unique_profile};
use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    domain::{
        profiles::{CustomerProfileForm, today, validate_customer_profile},
        role::Role,
    },
    extract::{Json, Multipart},
    middleware::{self, AuthUser},
    models::{CreateCustomerProfileEntity, CustomerProfileEntity, UpdateCustomerProfileEntity},
    routes::uploads::{ProfilePictureUpload, read_file_field},
    schema::customer_profiles,
};

const PROFILE_PICTURES: &str = "profile_pictures";

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/profiles/customer",
        OpenApiRouter::new()
            .routes(routes!(list_profiles, create_profile))
            .routes(routes!(get_profile, update_profile, delete_profile))
            .routes(routes!(upload_picture))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authorization,
            )),
    )
}

async fn find_own(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    id: i32,
) -> Result<CustomerProfileEntity, AppError> {
    let profile: CustomerProfileEntity = customer_profiles::table
        .find(id)
        .filter(customer_profiles::user_id.eq(user_id))
        .select(CustomerProfileEntity::as_select())
        .first(conn)
        .await?;
    Ok(profile)
}

/// The caller's customer profile as a list of zero or one rows.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Customer profiles"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Profile of the caller", body = StdResponse<Vec<CustomerProfileEntity>, String>)
    )
)]
async fn list_profiles(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let profiles: Vec<CustomerProfileEntity> = customer_profiles::table
        .filter(customer_profiles::user_id.eq(user.id))
        .select(CustomerProfileEntity::as_select())
        .load(conn)
        .await
        .context("Failed to get customer profile")?;

    Ok(StdResponse {
        data: Some(profiles),
        message: Some("Get customer profile successfully"),
    })
}

/// Create the caller's customer profile. Customers only, one per user.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Customer profiles"],
    security(("bearerAuth" = [])),
    request_body = CustomerProfileForm,
    responses(
        (status = 201, description = "Profile created", body = StdResponse<CustomerProfileEntity, String>),
        (status = 400, description = "Field errors or profile already exists"),
        (status = 403, description = "Caller is not a customer")
    )
)]
async fn create_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CustomerProfileForm>,
) -> Result<impl IntoResponse, AppError> {
    if user.role != Role::Customer {
        return Err(AppError::Forbidden(
            "Only customers can create a customer profile.".into(),
        ));
    }
    validate_customer_profile(&body, today()).map_err(AppError::Validation)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let existing: Option<i32> = customer_profiles::table
        .filter(customer_profiles::user_id.eq(user.id))
        .select(customer_profiles::id)
        .first(conn)
        .await
        .optional()
        .context("Failed to check customer profile")?;
    if existing.is_some() {
        return Err(profile_exists());
    }

    let default_address_id = body.default_address_id.flatten();
    check_own_address(conn, user.id, "default_address_id", default_address_id).await?;

    let profile: CustomerProfileEntity = diesel::insert_into(customer_profiles::table)
        .values(CreateCustomerProfileEntity {
            user_id: user.id,
            date_of_birth: body.date_of_birth.flatten(),
            bio: body.bio.map(|bio| bio.trim().to_string()).unwrap_or_default(),
            default_address_id,
        })
        .returning(CustomerProfileEntity::as_returning())
        .get_result(conn)
        .await
        .map_err(unique_profile)?;

    info!(user_id = user.id, profile_id = profile.id, "Customer profile created");

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(profile),
            message: Some("Customer profile created successfully"),
        },
    ))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Customer profiles"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Profile ID")
    ),
    responses(
        (status = 200, description = "Profile", body = StdResponse<CustomerProfileEntity, String>),
        (status = 404, description = "Not the caller's profile")
    )
)]
async fn get_profile(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let profile = find_own(conn, user.id, id).await?;

    Ok(StdResponse {
        data: Some(profile),
        message: Some("Get customer profile successfully"),
    })
}

/// Update the caller's profile. Keys left out of the body keep their stored value.
#[utoipa::path(
    put,
    path = "/{id}",
    tags = ["Customer profiles"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Profile ID")
    ),
    request_body = CustomerProfileForm,
    responses(
        (status = 200, description = "Profile updated", body = StdResponse<CustomerProfileEntity, String>),
        (status = 400, description = "Field errors"),
        (status = 404, description = "Not the caller's profile")
    )
)]
async fn update_profile(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CustomerProfileForm>,
) -> Result<impl IntoResponse, AppError> {
    validate_customer_profile(&body, today()).map_err(AppError::Validation)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    find_own(conn, user.id, id).await?;
    check_own_address(
        conn,
        user.id,
        "default_address_id",
        body.default_address_id.flatten(),
    )
    .await?;

    let profile: CustomerProfileEntity = diesel::update(customer_profiles::table.find(id))
        .set(UpdateCustomerProfileEntity {
            date_of_birth: body.date_of_birth,
            bio: body.bio.map(|bio| bio.trim().to_string()),
            default_address_id: body.default_address_id,
            updated_at: Utc::now(),
        })
        .returning(CustomerProfileEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to update customer profile")?;

    Ok(StdResponse {
        data: Some(profile),
        message: Some("Customer profile updated successfully"),
    })
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Customer profiles"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Profile ID")
    ),
    responses(
        (status = 204, description = "Profile deleted"),
        (status = 404, description = "Not the caller's profile")
    )
)]
async fn delete_profile(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted = diesel::delete(customer_profiles::table)
        .filter(customer_profiles::id.eq(id))
        .filter(customer_profiles::user_id.eq(user.id))
        .execute(conn)
        .await
        .context("Failed to delete customer profile")?;

    if deleted == 0 {
        return Err(AppError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Replace the profile picture. Multipart field `profile_picture`.
#[utoipa::path(
    post,
    path = "/{id}/upload_picture",
    tags = ["Customer profiles"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Profile ID")
    ),
    request_body(content = ProfilePictureUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Picture stored", body = StdResponse<CustomerProfileEntity, String>),
        (status = 400, description = "No file submitted"),
        (status = 404, description = "Not the caller's profile")
    )
)]
async fn upload_picture(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Multipart(mut multipart): Multipart,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    find_own(conn, user.id, id).await?;

    let file = read_file_field(&mut multipart, "profile_picture").await?;
    let reference = state
        .blob_store
        .put(PROFILE_PICTURES, &file.filename, &file.bytes)
        .await?;

    let profile: CustomerProfileEntity = diesel::update(customer_profiles::table.find(id))
        .set((
            customer_profiles::profile_picture.eq(Some(reference)),
            customer_profiles::updated_at.eq(Utc::now()),
        ))
        .returning(CustomerProfileEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to update profile picture")?;

    info!(user_id = user.id, profile_id = id, "Profile picture uploaded");

    Ok(StdResponse {
        data: Some(profile),
        message: Some("Profile picture uploaded successfully"),
    })
}
