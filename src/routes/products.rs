use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::info;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    domain::{
        catalog::{ProductForm, ValidProduct, validate_product},
        role::Role,
    },
    extract::{Json, Multipart},
    middleware::{self, AuthUser},
    models::{ProductChanges, ProductEntity},
    routes::uploads::{ProductImageUpload, read_file_field},
    schema::products,
};

const PRODUCT_IMAGES: &str = "products";
const SHOPKEEPERS_ONLY: &str = "Only shopkeepers can manage products.";

/// Catalog routes. Reads are open to every signed-in user, writes to the owning shopkeeper.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/products",
        OpenApiRouter::new()
            .routes(routes!(list_products, create_product))
            .routes(routes!(my_products))
            .routes(routes!(get_product, update_product, delete_product))
            .routes(routes!(upload_image))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authorization,
            )),
    )
}

fn require_shopkeeper(user: &AuthUser) -> Result<(), AppError> {
    if user.is_shopkeeper() {
        Ok(())
    } else {
        Err(AppError::Forbidden(SHOPKEEPERS_ONLY.into()))
    }
}

impl From<ValidProduct> for ProductChanges {
    fn from(product: ValidProduct) -> Self {
        Self {
            name: product.name,
            description: product.description,
            price: product.price,
            category: product.category.as_str().to_string(),
            subcategory: product.subcategory,
            stock: product.stock,
        }
    }
}

async fn load_owned_products(
    conn: &mut AsyncPgConnection,
    owner_id: i32,
) -> Result<Vec<ProductEntity>, AppError> {
    let products: Vec<ProductEntity> = products::table
        .filter(products::created_by.eq(owner_id))
        .order_by(products::created_at.desc())
        .select(ProductEntity::as_select())
        .load(conn)
        .await
        .context("Failed to get products")?;

    Ok(products)
}

/// List products. Shopkeepers see their own catalog, customers see everything.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List products", body = StdResponse<Vec<ProductEntity>, String>)
    )
)]
async fn list_products(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let products = match user.role {
        Role::Shopkeeper => load_owned_products(conn, user.id).await?,
        Role::Customer => products::table
            .order_by(products::created_at.desc())
            .select(ProductEntity::as_select())
            .load(conn)
            .await
            .context("Failed to get products")?,
    };

    Ok(StdResponse {
        data: Some(products),
        message: Some("Get products successfully"),
    })
}

/// Products created by the caller.
#[utoipa::path(
    get,
    path = "/my_products",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Products of the caller", body = StdResponse<Vec<ProductEntity>, String>),
        (status = 403, description = "Caller is not a shopkeeper")
    )
)]
async fn my_products(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    require_shopkeeper(&user)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let products = load_owned_products(conn, user.id).await?;

    Ok(StdResponse {
        data: Some(products),
        message: Some("Get my products successfully"),
    })
}

/// Add a product to the caller's catalog.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    request_body = ProductForm,
    responses(
        (status = 201, description = "Product created", body = StdResponse<ProductEntity, String>),
        (status = 400, description = "Field errors"),
        (status = 403, description = "Caller is not a shopkeeper")
    )
)]
async fn create_product(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ProductForm>,
) -> Result<impl IntoResponse, AppError> {
    require_shopkeeper(&user)?;
    let product = validate_product(body).map_err(AppError::Validation)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product: ProductEntity = diesel::insert_into(products::table)
        .values((
            ProductChanges::from(product),
            products::created_by.eq(user.id),
        ))
        .returning(ProductEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create product")?;

    info!(user_id = user.id, product_id = product.id, "Product created");

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(product),
            message: Some("Product created successfully"),
        },
    ))
}

/// Fetch one product.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product", body = StdResponse<ProductEntity, String>),
        (status = 404, description = "No such product")
    )
)]
async fn get_product(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product: ProductEntity = products::table
        .find(id)
        .select(ProductEntity::as_select())
        .first(conn)
        .await?;

    Ok(StdResponse {
        data: Some(product),
        message: Some("Get product successfully"),
    })
}

/// Replace a product owned by the caller.
#[utoipa::path(
    put,
    path = "/{id}",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product ID")
    ),
    request_body = ProductForm,
    responses(
        (status = 200, description = "Product updated", body = StdResponse<ProductEntity, String>),
        (status = 400, description = "Field errors"),
        (status = 403, description = "Caller is not a shopkeeper"),
        (status = 404, description = "Not one of the caller's products")
    )
)]
async fn update_product(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ProductForm>,
) -> Result<impl IntoResponse, AppError> {
    require_shopkeeper(&user)?;
    let product = validate_product(body).map_err(AppError::Validation)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product: ProductEntity = diesel::update(products::table)
        .filter(products::id.eq(id))
        .filter(products::created_by.eq(user.id))
        .set((
            ProductChanges::from(product),
            products::updated_at.eq(Utc::now()),
        ))
        .returning(ProductEntity::as_returning())
        .get_result(conn)
        .await?;

    info!(user_id = user.id, product_id = product.id, "Product updated");

    Ok(StdResponse {
        data: Some(product),
        message: Some("Product updated successfully"),
    })
}

/// Delete a product owned by the caller. Past orders keep their captured name and price.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product ID")
    ),
    responses(
        (status = 204, description = "Product deleted"),
        (status = 403, description = "Caller is not a shopkeeper"),
        (status = 404, description = "Not one of the caller's products")
    )
)]
async fn delete_product(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    require_shopkeeper(&user)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted = diesel::delete(products::table)
        .filter(products::id.eq(id))
        .filter(products::created_by.eq(user.id))
        .execute(conn)
        .await
        .context("Failed to delete product")?;

    if deleted == 0 {
        return Err(AppError::NotFound);
    }

    info!(user_id = user.id, product_id = id, "Product deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Attach an image to a product owned by the caller. Multipart field `image`.
#[utoipa::path(
    post,
    path = "/{id}/upload_image",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product ID")
    ),
    request_body(content = ProductImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image stored", body = StdResponse<ProductEntity, String>),
        (status = 400, description = "No file submitted"),
        (status = 403, description = "Caller is not a shopkeeper"),
        (status = 404, description = "Not one of the caller's products")
    )
)]
async fn upload_image(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Multipart(mut multipart): Multipart,
) -> Result<impl IntoResponse, AppError> {
    require_shopkeeper(&user)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    products::table
        .filter(products::id.eq(id))
        .filter(products::created_by.eq(user.id))
        .select(products::id)
        .first::<i32>(conn)
        .await?;

    let file = read_file_field(&mut multipart, "image").await?;
    let reference = state
        .blob_store
        .put(PRODUCT_IMAGES, &file.filename, &file.bytes)
        .await?;

    let product: ProductEntity = diesel::update(products::table.find(id))
        .set((
            products::image.eq(Some(reference)),
            products::updated_at.eq(Utc::now()),
        ))
        .returning(ProductEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to update product image")?;

    Ok(StdResponse {
        data: Some(product),
        message: Some("Image uploaded successfully"),
    })
}
