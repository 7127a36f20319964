use axum::Router;
use utoipa::openapi::{
    OpenApi,
    security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

/// Serves the Swagger UI and the OpenAPI document, with `bearerAuth` registered.
pub fn create_swagger_ui<S>(mut openapi: OpenApi) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    openapi
        .components
        .get_or_insert_with(Default::default)
        .add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );

    SwaggerUi::new("/swagger-ui").url(OPENAPI_PATH, openapi).into()
}
