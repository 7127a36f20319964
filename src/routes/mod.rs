use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa::openapi::InfoBuilder;
use utoipa_axum::router::OpenApiRouter;

use crate::{app_state::AppState, swagger};

pub mod addresses;
pub mod auth;
pub mod cart;
pub mod dashboard;
pub mod orders;
pub mod products;
pub mod profiles;
pub mod uploads;

/// Every resource router merged, documented and bound to `state`.
pub fn app(state: AppState) -> Router {
    let routes: OpenApiRouter<AppState> = auth::routes_with_openapi(state.clone())
        .merge(addresses::routes_with_openapi(state.clone()))
        .merge(profiles::routes_with_openapi(state.clone()))
        .merge(products::routes_with_openapi(state.clone()))
        .merge(cart::routes_with_openapi(state.clone()))
        .merge(orders::routes_with_openapi(state.clone()))
        .merge(dashboard::routes_with_openapi(state.clone()));

    let (router, mut openapi) = routes.split_for_parts();
    openapi.info = InfoBuilder::new()
        .title("Sello API")
        .version(env!("CARGO_PKG_VERSION"))
        .build();

    router
        .merge(swagger::create_swagger_ui(openapi))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
