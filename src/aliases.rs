use diesel_async::{
    AsyncPgConnection,
    pooled_connection::{AsyncDieselConnectionManager, bb8},
};

pub type DieselError = diesel::result::Error;

pub type DbPool = bb8::Pool<AsyncPgConnection>;

pub type DbConnectionManager = AsyncDieselConnectionManager<AsyncPgConnection>;
