use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/uploads", upload_routes(config))
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::auth::register))
        .routes(routes!(handlers::auth::login))
        .routes(routes!(handlers::auth::me))
}

fn upload_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let start = OpenApiRouter::new()
        .routes(routes!(
            handlers::upload::start_upload,
            handlers::upload::list_uploads
        ))
        .layer(handlers::upload::upload_body_limit(
            config.upload.max_file_size,
        ));

    start
        .routes(routes!(handlers::upload::get_upload))
        .routes(routes!(handlers::upload::stream_upload))
}
