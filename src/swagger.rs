use actix_web::web;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use crate::models::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::member::register,
        handlers::member::list_members,
        handlers::member::get_statistics,
        handlers::member::get_member,
        handlers::member::update_member,
        handlers::member::delete_member,
        handlers::pass::generate,
        handlers::pass::regenerate,
        handlers::pass::revoke,
        handlers::pass::update_status,
        handlers::pass::list_active,
        handlers::pass::is_active,
        handlers::pass::get_url,
        handlers::pass::download_apple,
        handlers::pass::google_save_redirect,
    ),
    components(
        schemas(
            MemberStatus,
            CreateMemberRequest,
            UpdateMemberRequest,
            MemberResponse,
            MemberStatistics,
            MemberListQuery,
            PassStatus,
            PassGenerationResponse,
            PassRecordResponse,
            MemberIdRequest,
            UpdatePassStatusRequest,
            PaginationParams,
            PaginationInfo,
        )
    ),
    tags(
        (name = "members", description = "Member self-service"),
        (name = "passes", description = "Wallet pass lifecycle"),
        (name = "admin", description = "Membership administration")
    ),
    info(
        title = "Membership Pass API",
        description = "Membership registration and wallet pass management"
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    );
}
