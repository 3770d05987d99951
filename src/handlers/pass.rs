use actix_web::{http::header, web, HttpResponse, ResponseError, Result};
use serde_json::json;

use crate::models::*;
use crate::services::{EmailNotificationService, MemberService, PassService};

#[utoipa::path(
    post,
    path = "/passes/generate",
    tag = "passes",
    request_body = MemberIdRequest,
    responses(
        (status = 200, description = "Generation attempted on both platforms", body = PassGenerationResponse),
        (status = 404, description = "Member not found")
    )
)]
pub async fn generate(
    pass_service: web::Data<PassService>,
    request: web::Json<MemberIdRequest>,
) -> Result<HttpResponse> {
    match pass_service.generate_passes(request.member_id).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/passes/regenerate",
    tag = "passes",
    request_body = MemberIdRequest,
    responses(
        (status = 200, description = "Passes rebuilt", body = PassGenerationResponse),
        (status = 404, description = "Member not found")
    )
)]
pub async fn regenerate(
    member_service: web::Data<MemberService>,
    pass_service: web::Data<PassService>,
    email_service: web::Data<EmailNotificationService>,
    request: web::Json<MemberIdRequest>,
) -> Result<HttpResponse> {
    let member_id = request.member_id;
    let response = match pass_service.regenerate_passes(member_id).await {
        Ok(response) => response,
        Err(e) => return Ok(e.error_response()),
    };

    if let Ok(member) = member_service.get_member(member_id).await {
        email_service
            .send_pass_regeneration_email(
                &member,
                response.apple_pass_url.as_deref(),
                response.google_pass_url.as_deref(),
            )
            .await;
    }

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": response
    })))
}

#[utoipa::path(
    post,
    path = "/passes/revoke",
    tag = "passes",
    request_body = MemberIdRequest,
    responses(
        (status = 200, description = "Revoked, or nothing to revoke")
    )
)]
pub async fn revoke(
    pass_service: web::Data<PassService>,
    request: web::Json<MemberIdRequest>,
) -> Result<HttpResponse> {
    match pass_service.revoke_pass(request.member_id).await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": {
                "revoked": outcome == RevokeOutcome::Revoked
            }
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/passes/status",
    tag = "passes",
    request_body = UpdatePassStatusRequest,
    responses(
        (status = 200, description = "Status updated and passes refreshed", body = PassGenerationResponse),
        (status = 404, description = "Member or pass record not found")
    )
)]
pub async fn update_status(
    pass_service: web::Data<PassService>,
    request: web::Json<UpdatePassStatusRequest>,
) -> Result<HttpResponse> {
    let request = request.into_inner();
    match pass_service
        .update_pass_status(request.member_id, request.status)
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/passes/active",
    tag = "passes",
    responses(
        (status = 200, description = "All active pass records")
    )
)]
pub async fn list_active(pass_service: web::Data<PassService>) -> Result<HttpResponse> {
    match pass_service.list_active_passes().await {
        Ok(passes) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": passes
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/passes/url/{member_id}",
    tag = "passes",
    params(("member_id" = i64, Path, description = "Member id")),
    responses(
        (status = 200, description = "Save link for the member's active pass"),
        (status = 404, description = "No active Google pass")
    )
)]
pub async fn get_url(
    pass_service: web::Data<PassService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match pass_service.get_pass_url(path.into_inner()).await {
        Ok(url) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": {
                "google_pass_url": url
            }
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/passes/active/{member_id}",
    tag = "passes",
    params(("member_id" = i64, Path, description = "Member id")),
    responses(
        (status = 200, description = "Whether the member holds an active pass")
    )
)]
pub async fn is_active(
    pass_service: web::Data<PassService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match pass_service.has_active_pass(path.into_inner()).await {
        Ok(active) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": {
                "active": active
            }
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/passes/{member_id}/apple",
    tag = "passes",
    params(("member_id" = i64, Path, description = "Member id")),
    responses(
        (status = 200, description = "Signed bundle as application/vnd.apple.pkpass"),
        (status = 404, description = "No active Apple pass")
    )
)]
pub async fn download_apple(
    pass_service: web::Data<PassService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let member_id = path.into_inner();
    let pkpass_path = match pass_service.get_apple_pass_path(member_id).await {
        Ok(path) => path,
        Err(e) => return Ok(e.error_response()),
    };

    let bundle = match std::fs::read(&pkpass_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("Pass bundle missing at {pkpass_path}: {e}");
            return Ok(crate::error::AppError::NotFound(
                "Pass bundle is no longer available; regenerate it".to_string(),
            )
            .error_response());
        }
    };

    if let Err(e) = pass_service.mark_apple_added(member_id).await {
        log::warn!("Could not mark Apple pass added for member {member_id}: {e}");
    }

    let filename = std::path::Path::new(&pkpass_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pass.pkpass".to_string());

    Ok(HttpResponse::Ok()
        .content_type("application/vnd.apple.pkpass")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ))
        .body(bundle))
}

#[utoipa::path(
    get,
    path = "/passes/{member_id}/google",
    tag = "passes",
    params(("member_id" = i64, Path, description = "Member id")),
    responses(
        (status = 302, description = "Redirect to the save link"),
        (status = 404, description = "No active Google pass")
    )
)]
pub async fn google_save_redirect(
    pass_service: web::Data<PassService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let member_id = path.into_inner();
    let save_url = match pass_service.get_pass_url(member_id).await {
        Ok(url) => url,
        Err(e) => return Ok(e.error_response()),
    };

    if let Err(e) = pass_service.mark_google_added(member_id).await {
        log::warn!("Could not mark Google pass added for member {member_id}: {e}");
    }

    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, save_url))
        .finish())
}

pub fn pass_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/passes")
            .route("/generate", web::post().to(generate))
            .route("/regenerate", web::post().to(regenerate))
            .route("/revoke", web::post().to(revoke))
            .route("/status", web::post().to(update_status))
            .route("/active", web::get().to(list_active))
            .route("/active/{member_id}", web::get().to(is_active))
            .route("/url/{member_id}", web::get().to(get_url))
            .route("/{member_id}/apple", web::get().to(download_apple))
            .route("/{member_id}/google", web::get().to(google_save_redirect)),
    );
}
