use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, result::DatabaseErrorKind};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    aliases::DieselError,
    app_error::{AppError, FieldErrors, NON_FIELD_ERRORS},
    app_state::AppState,
    domain::profiles::PROFILE_EXISTS,
    schema::addresses,
};

pub mod customer;
pub mod shopkeeper;

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .merge(customer::routes_with_openapi(state.clone()))
        .merge(shopkeeper::routes_with_openapi(state))
}

fn profile_exists() -> AppError {
    AppError::Validation(FieldErrors::single(NON_FIELD_ERRORS, PROFILE_EXISTS))
}

/// Maps a unique violation on `user_id` to the one-profile-per-user error.
fn unique_profile(err: DieselError) -> AppError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => profile_exists(),
        other => other.into(),
    }
}

/// An address referenced from a profile must belong to the profile owner.
async fn check_own_address(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    field: &str,
    address_id: Option<i32>,
) -> Result<(), AppError> {
    let Some(address_id) = address_id else {
        return Ok(());
    };

    let found: Option<i32> = addresses::table
        .find(address_id)
        .filter(addresses::user_id.eq(user_id))
        .select(addresses::id)
        .first(conn)
        .await
        .optional()?;

    match found {
        Some(_) => Ok(()),
        None => Err(AppError::Validation(FieldErrors::single(
            field,
            format!("Invalid pk \"{address_id}\" - object does not exist."),
        ))),
    }
}
