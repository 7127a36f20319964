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
    domain::profiles::{ShopkeeperProfileForm, ValidShopkeeperProfile, validate_shopkeeper_profile},
    extract::{Json, Multipart},
    middleware::{self, AuthUser},
    models::{ShopkeeperProfileChanges, ShopkeeperProfileEntity},
    routes::uploads::{StoreBannerUpload, StoreLogoUpload, read_file_field},
    schema::shopkeeper_profiles,
};

const STORE_LOGOS: &str = "store_logos";
const STORE_BANNERS: &str = "store_banners";

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/profiles/shopkeeper",
        OpenApiRouter::new()
            .routes(routes!(list_profiles, create_profile))
            .routes(routes!(get_profile, update_profile, delete_profile))
            .routes(routes!(upload_logo))
            .routes(routes!(upload_banner))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authorization,
            )),
    )
}

impl From<ValidShopkeeperProfile> for ShopkeeperProfileChanges {
    fn from(profile: ValidShopkeeperProfile) -> Self {
        Self {
            store_name: profile.store_name,
            store_description: profile.store_description,
            business_registration_number: profile.business_registration_number,
            store_address_id: profile.store_address_id,
            business_phone: profile.business_phone,
            business_email: profile.business_email,
            tax_id: profile.tax_id,
        }
    }
}

async fn find_own(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    id: i32,
) -> Result<ShopkeeperProfileEntity, AppError> {
    let profile: ShopkeeperProfileEntity = shopkeeper_profiles::table
        .find(id)
        .filter(shopkeeper_profiles::user_id.eq(user_id))
        .select(ShopkeeperProfileEntity::as_select())
        .first(conn)
        .await?;
    Ok(profile)
}

/// The caller's store profile as a list of zero or one rows.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Shopkeeper profiles"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Profile of the caller", body = StdResponse<Vec<ShopkeeperProfileEntity>, String>)
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

    let profiles: Vec<ShopkeeperProfileEntity> = shopkeeper_profiles::table
        .filter(shopkeeper_profiles::user_id.eq(user.id))
        .select(ShopkeeperProfileEntity::as_select())
        .load(conn)
        .await
        .context("Failed to get shopkeeper profile")?;

    Ok(StdResponse {
        data: Some(profiles),
        message: Some("Get shopkeeper profile successfully"),
    })
}

/// Create the caller's store profile. Shopkeepers only, one per user.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Shopkeeper profiles"],
    security(("bearerAuth" = [])),
    request_body = ShopkeeperProfileForm,
    responses(
        (status = 201, description = "Profile created", body = StdResponse<ShopkeeperProfileEntity, String>),
        (status = 400, description = "Field errors or profile already exists"),
        (status = 403, description = "Caller is not a shopkeeper")
    )
)]
async fn create_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ShopkeeperProfileForm>,
) -> Result<impl IntoResponse, AppError> {
    if !user.is_shopkeeper() {
        return Err(AppError::Forbidden(
            "Only shopkeepers can create a shopkeeper profile.".into(),
        ));
    }
    let profile = validate_shopkeeper_profile(&body).map_err(AppError::Validation)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let existing: Option<i32> = shopkeeper_profiles::table
        .filter(shopkeeper_profiles::user_id.eq(user.id))
        .select(shopkeeper_profiles::id)
        .first(conn)
        .await
        .optional()
        .context("Failed to check shopkeeper profile")?;
    if existing.is_some() {
        return Err(profile_exists());
    }

    check_own_address(conn, user.id, "store_address_id", profile.store_address_id).await?;

    let profile: ShopkeeperProfileEntity = diesel::insert_into(shopkeeper_profiles::table)
        .values((
            ShopkeeperProfileChanges::from(profile),
            shopkeeper_profiles::user_id.eq(user.id),
        ))
        .returning(ShopkeeperProfileEntity::as_returning())
        .get_result(conn)
        .await
        .map_err(unique_profile)?;

    info!(user_id = user.id, profile_id = profile.id, "Shopkeeper profile created");

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(profile),
            message: Some("Shopkeeper profile created successfully"),
        },
    ))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Shopkeeper profiles"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Profile ID")
    ),
    responses(
        (status = 200, description = "Profile", body = StdResponse<ShopkeeperProfileEntity, String>),
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
        message: Some("Get shopkeeper profile successfully"),
    })
}

#[utoipa::path(
    put,
    path = "/{id}",
    tags = ["Shopkeeper profiles"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Profile ID")
    ),
    request_body = ShopkeeperProfileForm,
    responses(
        (status = 200, description = "Profile updated", body = StdResponse<ShopkeeperProfileEntity, String>),
        (status = 400, description = "Field errors"),
        (status = 404, description = "Not the caller's profile")
    )
)]
async fn update_profile(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ShopkeeperProfileForm>,
) -> Result<impl IntoResponse, AppError> {
    let profile = validate_shopkeeper_profile(&body).map_err(AppError::Validation)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    find_own(conn, user.id, id).await?;
    check_own_address(conn, user.id, "store_address_id", profile.store_address_id).await?;

    let profile: ShopkeeperProfileEntity = diesel::update(shopkeeper_profiles::table.find(id))
        .set((
            ShopkeeperProfileChanges::from(profile),
            shopkeeper_profiles::updated_at.eq(Utc::now()),
        ))
        .returning(ShopkeeperProfileEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to update shopkeeper profile")?;

    Ok(StdResponse {
        data: Some(profile),
        message: Some("Shopkeeper profile updated successfully"),
    })
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Shopkeeper profiles"],
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

    let deleted = diesel::delete(shopkeeper_profiles::table)
        .filter(shopkeeper_profiles::id.eq(id))
        .filter(shopkeeper_profiles::user_id.eq(user.id))
        .execute(conn)
        .await
        .context("Failed to delete shopkeeper profile")?;

    if deleted == 0 {
        return Err(AppError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Which image slot of a store profile an upload replaces.
#[derive(Debug, Clone, Copy)]
enum StoreImage {
    Logo,
    Banner,
}

impl StoreImage {
    fn field(self) -> &'static str {
        match self {
            StoreImage::Logo => "store_logo",
            StoreImage::Banner => "store_banner",
        }
    }

    fn folder(self) -> &'static str {
        match self {
            StoreImage::Logo => STORE_LOGOS,
            StoreImage::Banner => STORE_BANNERS,
        }
    }
}

async fn store_image(
    state: AppState,
    user: AuthUser,
    id: i32,
    Multipart(mut multipart): Multipart,
    slot: StoreImage,
) -> Result<ShopkeeperProfileEntity, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    find_own(conn, user.id, id).await?;

    let file = read_file_field(&mut multipart, slot.field()).await?;
    let reference = state
        .blob_store
        .put(slot.folder(), &file.filename, &file.bytes)
        .await?;

    let target = diesel::update(shopkeeper_profiles::table.find(id));
    let updated_at = shopkeeper_profiles::updated_at.eq(Utc::now());
    let profile: ShopkeeperProfileEntity = match slot {
        StoreImage::Logo => {
            target
                .set((shopkeeper_profiles::store_logo.eq(Some(reference)), updated_at))
                .returning(ShopkeeperProfileEntity::as_returning())
                .get_result(conn)
                .await
        }
        StoreImage::Banner => {
            target
                .set((shopkeeper_profiles::store_banner.eq(Some(reference)), updated_at))
                .returning(ShopkeeperProfileEntity::as_returning())
                .get_result(conn)
                .await
        }
    }
    .context("Failed to update store image")?;

    info!(user_id = user.id, profile_id = id, field = slot.field(), "Store image uploaded");

    Ok(profile)
}

/// Replace the store logo. Multipart field `store_logo`.
#[utoipa::path(
    post,
    path = "/{id}/upload_logo",
    tags = ["Shopkeeper profiles"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Profile ID")
    ),
    request_body(content = StoreLogoUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Logo stored", body = StdResponse<ShopkeeperProfileEntity, String>),
        (status = 400, description = "No file submitted"),
        (status = 404, description = "Not the caller's profile")
    )
)]
async fn upload_logo(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let profile = store_image(state, user, id, multipart, StoreImage::Logo).await?;

    Ok(StdResponse {
        data: Some(profile),
        message: Some("Store logo uploaded successfully"),
    })
}

/// Replace the store banner. Multipart field `store_banner`.
#[utoipa::path(
    post,
    path = "/{id}/upload_banner",
    tags = ["Shopkeeper profiles"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Profile ID")
    ),
    request_body(content = StoreBannerUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Banner stored", body = StdResponse<ShopkeeperProfileEntity, String>),
        (status = 400, description = "No file submitted"),
        (status = 404, description = "Not the caller's profile")
    )
)]
async fn upload_banner(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let profile = store_image(state, user, id, multipart, StoreImage::Banner).await?;

    Ok(StdResponse {
        data: Some(profile),
        message: Some("Store banner uploaded successfully"),
    })
}
