//! OpenAPI / Swagger UI documentation for the webhook and admin surface.
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Signal Execution Engine API",
        version = "1.0.0",
        description = "Webhook ingestion and admin surface for the multi-account trading execution engine.",
        license(name = "MIT")
    ),
    paths(
        crate::gateway::webhook_handler,
        crate::gateway::admin_rebalance,
        crate::gateway::admin_cache_warm,
        crate::gateway::admin_cache_clear,
        crate::gateway::admin_queue_depth,
        crate::gateway::admin_rebalance_metrics,
        crate::gateway::health_check,
    ),
    tags(
        (name = "Webhook", description = "Trading-signal ingestion"),
        (name = "Admin", description = "Manual rebalance trigger, cache control, queue and metrics inspection"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_spec_generates() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Signal Execution Engine API");
    }

    #[test]
    fn openapi_json_serializable() {
        let spec = ApiDoc::openapi();
        assert!(spec.to_json().is_ok());
    }

    #[test]
    fn webhook_path_registered() {
        let spec = ApiDoc::openapi();
        assert!(spec.paths.paths.contains_key("/webhook"));
    }
}
