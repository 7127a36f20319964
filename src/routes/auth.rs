use anyhow::Context;
use axum::{Extension, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use diesel::{
    ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper,
    result::DatabaseErrorKind,
};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    aliases::DieselError,
    api::{
        passwords::{UserAttributes, hash_password, verify_password},
        tokens::TokenType,
    },
    app_error::{AppError, FieldErrors, NON_FIELD_ERRORS, StdResponse},
    app_state::AppState,
    domain::identity::{
        DUPLICATE_EMAIL, INVALID_CREDENTIALS, LoginForm, SignupForm, UpdateAccountForm,
        normalize_email, validate_account_update, validate_login, validate_signup,
    },
    extract::Json,
    middleware::{self, AuthUser},
    models::{CreateBlacklistedTokenEntity, CreateUserEntity, UpdateUserEntity, UserEntity},
    schema::{blacklisted_tokens, users},
};

/// Signup, signin, token refresh (public) and signout, profile of the caller (authenticated).
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    let public = OpenApiRouter::new()
        .routes(routes!(signup))
        .routes(routes!(signin))
        .routes(routes!(refresh_token));

    let protected = OpenApiRouter::new()
        .routes(routes!(signout))
        .routes(routes!(get_me, update_me))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::authorization,
        ));

    public.merge(protected)
}

#[derive(Serialize, ToSchema)]
pub struct AuthRes {
    pub user: UserEntity,
    pub refresh: String,
    pub access: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshReq {
    pub refresh: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct RefreshRes {
    pub access: String,
}

async fn email_in_use(
    conn: &mut AsyncPgConnection,
    email: &str,
    except_user: Option<i32>,
) -> Result<bool, AppError> {
    let mut query = users::table
        .filter(users::email.eq(email))
        .select(users::id)
        .into_boxed();
    if let Some(user_id) = except_user {
        query = query.filter(users::id.ne(user_id));
    }

    let existing: Option<i32> = query
        .first(conn)
        .await
        .optional()
        .context("Failed to check email")?;

    Ok(existing.is_some())
}

fn duplicate_email(err: DieselError) -> AppError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            AppError::Validation(FieldErrors::single("email", DUPLICATE_EMAIL))
        }
        other => other.into(),
    }
}

async fn hash_in_background(password: String) -> Result<String, AppError> {
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("Password hashing task failed")??;
    Ok(hash)
}

/// Register a new account and sign it in.
#[utoipa::path(
    post,
    path = "/signup",
    tags = ["Auth"],
    request_body = SignupForm,
    responses(
        (status = 201, description = "Account created", body = StdResponse<AuthRes, String>),
        (status = 400, description = "Field errors")
    )
)]
async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupForm>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let email_taken = match body.email.as_deref() {
        Some(email) => email_in_use(conn, &normalize_email(email), None).await?,
        None => false,
    };

    let account = validate_signup(body, email_taken).map_err(|errors| {
        warn!(?errors, "Registration validation failed");
        AppError::Validation(errors)
    })?;

    let password_hash = hash_in_background(account.password).await?;

    let user: UserEntity = diesel::insert_into(users::table)
        .values(CreateUserEntity {
            email: account.email,
            password_hash,
            first_name: account.first_name,
            last_name: account.last_name,
            phone: account.phone,
            role: account.role,
        })
        .returning(UserEntity::as_returning())
        .get_result(conn)
        .await
        .map_err(duplicate_email)?;

    let tokens = state
        .tokens
        .issue_pair(user.id, user.role)
        .context("Failed to issue tokens")?;

    info!(user_id = user.id, role = %user.role, "Registration successful");

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(AuthRes {
                user,
                refresh: tokens.refresh,
                access: tokens.access,
            }),
            message: Some("Signed up successfully"),
        },
    ))
}

/// Exchange email and password for a token pair.
#[utoipa::path(
    post,
    path = "/signin",
    tags = ["Auth"],
    request_body = LoginForm,
    responses(
        (status = 200, description = "Signed in", body = StdResponse<AuthRes, String>),
        (status = 400, description = "Invalid credentials")
    )
)]
async fn signin(
    State(state): State<AppState>,
    Json(body): Json<LoginForm>,
) -> Result<impl IntoResponse, AppError> {
    let (email, password) = validate_login(body).map_err(AppError::Validation)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user: Option<UserEntity> = users::table
        .filter(users::email.eq(&email))
        .select(UserEntity::as_select())
        .first(conn)
        .await
        .optional()
        .context("Failed to get user")?;

    let invalid = || AppError::Validation(FieldErrors::single(NON_FIELD_ERRORS, INVALID_CREDENTIALS));

    let Some(user) = user else {
        warn!("Login failed for unknown email");
        return Err(invalid());
    };

    let hash = user.password_hash.clone();
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .context("Password verification task failed")?;
    if !matches {
        warn!(user_id = user.id, "Login failed: wrong password");
        return Err(invalid());
    }

    if !user.is_active {
        return Err(AppError::Validation(FieldErrors::single(
            NON_FIELD_ERRORS,
            "This account has been disabled.",
        )));
    }

    let user: UserEntity = diesel::update(users::table.find(user.id))
        .set(users::last_login.eq(Some(Utc::now())))
        .returning(UserEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to record login")?;

    let tokens = state
        .tokens
        .issue_pair(user.id, user.role)
        .context("Failed to issue tokens")?;

    info!(user_id = user.id, "Login successful");

    Ok(StdResponse {
        data: Some(AuthRes {
            user,
            refresh: tokens.refresh,
            access: tokens.access,
        }),
        message: Some("Signed in successfully"),
    })
}

/// Blacklist the caller's refresh token so it can no longer be exchanged.
#[utoipa::path(
    post,
    path = "/signout",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    request_body = RefreshReq,
    responses(
        (status = 205, description = "Signed out"),
        (status = 400, description = "Missing or invalid refresh token")
    )
)]
async fn signout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<RefreshReq>,
) -> Result<impl IntoResponse, AppError> {
    let refresh = body
        .refresh
        .ok_or_else(|| AppError::BadRequest("Refresh token is required.".into()))?;

    let claims = state
        .tokens
        .decode(&refresh, TokenType::Refresh)
        .map_err(|_| AppError::BadRequest("Token is invalid or expired".into()))?;

    if claims.sub != user.id {
        return Err(AppError::BadRequest(
            "Token does not belong to the current user".into(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    diesel::insert_into(blacklisted_tokens::table)
        .values(CreateBlacklistedTokenEntity {
            jti: claims.jti,
            user_id: user.id,
            expires_at: claims.expires_at(),
        })
        .on_conflict_do_nothing()
        .execute(conn)
        .await
        .context("Failed to blacklist token")?;

    info!(user_id = user.id, "Signed out");

    Ok(StatusCode::RESET_CONTENT)
}

/// Exchange a refresh token for a new access token.
#[utoipa::path(
    post,
    path = "/token/refresh",
    tags = ["Auth"],
    request_body = RefreshReq,
    responses(
        (status = 200, description = "New access token", body = StdResponse<RefreshRes, String>),
        (status = 401, description = "Invalid, expired or blacklisted token")
    )
)]
async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshReq>,
) -> Result<impl IntoResponse, AppError> {
    let refresh = body
        .refresh
        .ok_or_else(|| AppError::BadRequest("Refresh token is required.".into()))?;

    let claims = state
        .tokens
        .decode(&refresh, TokenType::Refresh)
        .map_err(|_| AppError::Unauthorized("Token is invalid or expired".into()))?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let blacklisted: i64 = blacklisted_tokens::table
        .find(claims.jti)
        .count()
        .get_result(conn)
        .await
        .context("Failed to check token blacklist")?;
    if blacklisted > 0 {
        return Err(AppError::Unauthorized("Token is blacklisted".into()));
    }

    let active: Option<bool> = users::table
        .find(claims.sub)
        .select(users::is_active)
        .first(conn)
        .await
        .optional()
        .context("Failed to get user")?;
    if active != Some(true) {
        return Err(AppError::Unauthorized("User not found or inactive".into()));
    }

    let access = state
        .tokens
        .issue(claims.sub, claims.role, TokenType::Access)
        .context("Failed to issue token")?;

    Ok(StdResponse {
        data: Some(RefreshRes { access }),
        message: Some("Token refreshed"),
    })
}

/// The authenticated account.
#[utoipa::path(
    get,
    path = "/me",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Current user", body = StdResponse<UserEntity, String>)
    )
)]
async fn get_me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user: UserEntity = users::table
        .find(user.id)
        .select(UserEntity::as_select())
        .first(conn)
        .await?;

    Ok(StdResponse {
        data: Some(user),
        message: Some("Get user successfully"),
    })
}

/// Update name, phone, email or password of the authenticated account. Role cannot change.
#[utoipa::path(
    patch,
    path = "/me",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    request_body = UpdateAccountForm,
    responses(
        (status = 200, description = "Updated user", body = StdResponse<UserEntity, String>),
        (status = 400, description = "Field errors")
    )
)]
async fn update_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<UpdateAccountForm>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let current: UserEntity = users::table
        .find(auth.id)
        .select(UserEntity::as_select())
        .first(conn)
        .await?;

    let email_taken = match body.email.as_deref() {
        Some(email) => email_in_use(conn, &normalize_email(email), Some(auth.id)).await?,
        None => false,
    };

    let changes = validate_account_update(
        body,
        email_taken,
        &UserAttributes {
            email: Some(&current.email),
            first_name: Some(&current.first_name),
            last_name: Some(&current.last_name),
        },
    )
    .map_err(AppError::Validation)?;

    let password_hash = match changes.password {
        Some(password) => Some(hash_in_background(password).await?),
        None => None,
    };

    let update = UpdateUserEntity {
        email: changes.email,
        password_hash,
        first_name: changes.first_name,
        last_name: changes.last_name,
        phone: changes.phone,
    };

    let nothing_to_change = update.email.is_none()
        && update.password_hash.is_none()
        && update.first_name.is_none()
        && update.last_name.is_none()
        && update.phone.is_none();

    let user = if nothing_to_change {
        current
    } else {
        diesel::update(users::table.find(auth.id))
            .set(&update)
            .returning(UserEntity::as_returning())
            .get_result(conn)
            .await
            .map_err(duplicate_email)?
    };

    info!(user_id = user.id, "Account updated");

    Ok(StdResponse {
        data: Some(user),
        message: Some("Updated user successfully"),
    })
}
