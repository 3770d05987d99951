use actix_web::{web, HttpResponse, ResponseError, Result};
use serde_json::json;

use crate::models::*;
use crate::services::{EmailNotificationService, MemberService, PassService};

#[utoipa::path(
    post,
    path = "/members/register",
    tag = "members",
    request_body = CreateMemberRequest,
    responses(
        (status = 200, description = "Member registered, passes generated", body = MemberResponse),
        (status = 400, description = "Invalid registration data")
    )
)]
pub async fn register(
    member_service: web::Data<MemberService>,
    pass_service: web::Data<PassService>,
    email_service: web::Data<EmailNotificationService>,
    request: web::Json<CreateMemberRequest>,
) -> Result<HttpResponse> {
    let member = match member_service.create_member(request.into_inner()).await {
        Ok(member) => member,
        Err(e) => return Ok(e.error_response()),
    };

    // Pass generation and the welcome email are best effort; the member is
    // registered either way and passes can be regenerated later.
    let passes = match pass_service.generate_passes(member.id).await {
        Ok(response) => Some(response),
        Err(e) => {
            log::error!("Pass generation failed for new member {}: {e}", member.id);
            None
        }
    };

    email_service
        .send_membership_email(
            &member,
            passes.as_ref().and_then(|p| p.apple_pass_url.as_deref()),
            passes.as_ref().and_then(|p| p.google_pass_url.as_deref()),
        )
        .await;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "member": MemberResponse::from(member),
            "passes": passes
        }
    })))
}

#[utoipa::path(
    get,
    path = "/admin/members",
    tag = "admin",
    params(
        ("search" = Option<String>, Query, description = "Match against name, email or member code"),
        ("status" = Option<MemberStatus>, Query, description = "Filter by status"),
        ("page" = Option<u32>, Query, description = "Page number"),
        ("per_page" = Option<u32>, Query, description = "Items per page")
    ),
    responses(
        (status = 200, description = "Paginated member list")
    )
)]
pub async fn list_members(
    member_service: web::Data<MemberService>,
    query: web::Query<MemberListQuery>,
) -> Result<HttpResponse> {
    match member_service.list_members(query.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/admin/members/statistics",
    tag = "admin",
    responses(
        (status = 200, description = "Membership statistics", body = MemberStatistics)
    )
)]
pub async fn get_statistics(member_service: web::Data<MemberService>) -> Result<HttpResponse> {
    match member_service.get_statistics().await {
        Ok(statistics) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": statistics
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/admin/members/{id}",
    tag = "admin",
    params(("id" = i64, Path, description = "Member id")),
    responses(
        (status = 200, description = "Member details", body = MemberResponse),
        (status = 404, description = "Member not found")
    )
)]
pub async fn get_member(
    member_service: web::Data<MemberService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match member_service.get_member(path.into_inner()).await {
        Ok(member) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": MemberResponse::from(member)
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/admin/members/{id}",
    tag = "admin",
    params(("id" = i64, Path, description = "Member id")),
    request_body = UpdateMemberRequest,
    responses(
        (status = 200, description = "Member updated", body = MemberResponse),
        (status = 400, description = "Invalid update"),
        (status = 404, description = "Member not found")
    )
)]
pub async fn update_member(
    member_service: web::Data<MemberService>,
    pass_service: web::Data<PassService>,
    path: web::Path<i64>,
    request: web::Json<UpdateMemberRequest>,
) -> Result<HttpResponse> {
    let member_id = path.into_inner();
    let member = match member_service.update_member(member_id, request.into_inner()).await {
        Ok(member) => member,
        Err(e) => return Ok(e.error_response()),
    };

    // Card content shows member details, so refresh the passes if any exist.
    let passes = match pass_service.has_active_pass(member_id).await {
        Ok(true) => match pass_service.regenerate_passes(member_id).await {
            Ok(response) => Some(response),
            Err(e) => {
                log::error!("Pass refresh failed for member {member_id}: {e}");
                None
            }
        },
        _ => None,
    };

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "member": MemberResponse::from(member),
            "passes": passes
        }
    })))
}

#[utoipa::path(
    delete,
    path = "/admin/members/{id}",
    tag = "admin",
    params(("id" = i64, Path, description = "Member id")),
    responses(
        (status = 200, description = "Member deleted"),
        (status = 404, description = "Member not found")
    )
)]
pub async fn delete_member(
    member_service: web::Data<MemberService>,
    pass_service: web::Data<PassService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let member_id = path.into_inner();

    if let Err(e) = pass_service.revoke_pass(member_id).await {
        log::error!("Pass revocation failed while deleting member {member_id}: {e}");
    }

    match member_service.delete_member(member_id).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Member deleted"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn member_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/members").route("/register", web::post().to(register)));
}

pub fn admin_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin/members")
            .route("", web::get().to(list_members))
            // Admin-side creation runs the same registration flow.
            .route("", web::post().to(register))
            .route("/statistics", web::get().to(get_statistics))
            .route("/{id}", web::get().to(get_member))
            .route("/{id}", web::put().to(update_member))
            .route("/{id}", web::delete().to(delete_member)),
    );
}
