pub mod protected;
pub mod public;

use std::sync::Arc;

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api_docs::ApiDoc;
use crate::app::{create_cors, AppState};

pub fn create_router(state: Arc<AppState>) -> Router {
    let swagger = SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi());

    Router::new()
        .merge(public::router(state.clone()))
        .merge(protected::router(state))
        .merge(swagger)
        .layer(create_cors())
}
