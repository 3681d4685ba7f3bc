//! OpenAPI documentation configuration

use utoipa::OpenApi;

/// Combined OpenAPI documentation for Mailer API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Mailer API",
        version = "0.1.0",
        description = "Bulk email campaigns sent through the caller's own mail relay account",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    nest(
        (path = "/api", api = domain_campaigns::handlers::ApiDoc)
    )
)]
pub struct ApiDoc;
