/// Authentication Routes
///
/// Registration with an invite token, login, invite issuance and the
/// current identity. Every handler delegates to `AuthService`.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, Claims};
use crate::configuration::ApplicationSettings;
use crate::error::{AppError, AuthError, ErrorContext};

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Invite token
    #[serde(default)]
    pub token: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub user_id: u64,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub username: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteResponse {
    pub token: String,
    pub expires_at: String,
}

/// Address used as the brute-force key for a login request.
///
/// The first `X-Forwarded-For` entry is only honored behind a trusted
/// proxy; otherwise the TCP peer address is used.
pub fn client_ip(req: &HttpRequest, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// POST /api/register
///
/// # Errors
/// - 400: invalid/used/expired invite, invalid username, weak password,
///   username taken, or too many invalid invites for this username
/// - 500: storage failure
pub async fn register(
    form: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");

    let user_id = auth
        .register(&form.username, &form.password, &form.token)
        .await
        .inspect_err(|e| context.log_error(e))?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = user_id,
        "Registration completed"
    );

    Ok(HttpResponse::Ok().json(RegisterResponse {
        success: true,
        user_id,
    }))
}

/// POST /api/login
///
/// # Errors
/// - 401: invalid credentials (unknown user and wrong password are
///   indistinguishable) or the client address is locked out
///   (`Retry-After` header set)
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
    application: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");
    let source = client_ip(&req, application.trust_forwarded_for);

    let outcome = auth
        .login(&form.username, &form.password, &source)
        .await
        .inspect_err(|e| context.log_error(e))?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = outcome.user_id,
        "Login completed"
    );

    Ok(HttpResponse::Ok().json(LoginResponse {
        success: true,
        token: outcome.token,
        username: outcome.username,
    }))
}

/// POST /api/generate-token
///
/// Issues a new invite. **Requires an admin session token.**
///
/// # Errors
/// - 401/403: missing or invalid token (middleware)
/// - 403: caller is not an admin
pub async fn generate_token(
    claims: web::ReqData<Claims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    if !claims.is_admin() {
        tracing::warn!(
            user_id = claims.user_id,
            "Non-admin attempted to issue an invite"
        );
        return Err(AuthError::Forbidden.into());
    }

    let invite = auth.issue_invite()?;

    tracing::info!(issued_by = claims.user_id, "Invite issued via API");

    Ok(HttpResponse::Ok().json(InviteResponse {
        token: invite.token,
        expires_at: invite.expires_at.to_rfc3339(),
    }))
}

/// GET /api/me
///
/// Returns the claims of the verified session token.
pub async fn get_current_user(claims: web::ReqData<Claims>) -> HttpResponse {
    HttpResponse::Ok().json(claims.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_client_ip_ignores_forwarded_header_by_default() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "203.0.113.9"))
            .peer_addr("10.1.2.3:5555".parse().unwrap())
            .to_http_request();

        assert_eq!(client_ip(&req, false), "10.1.2.3");
    }

    #[test]
    fn test_client_ip_uses_first_forwarded_entry_when_trusted() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "203.0.113.9, 10.0.0.1"))
            .peer_addr("10.1.2.3:5555".parse().unwrap())
            .to_http_request();

        assert_eq!(client_ip(&req, true), "203.0.113.9");
    }

    #[test]
    fn test_client_ip_drops_port() {
        let a = TestRequest::default()
            .peer_addr("10.1.2.3:5555".parse().unwrap())
            .to_http_request();
        let b = TestRequest::default()
            .peer_addr("10.1.2.3:6666".parse().unwrap())
            .to_http_request();

        assert_eq!(client_ip(&a, false), client_ip(&b, false));
    }

    #[test]
    fn test_client_ip_without_peer() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(client_ip(&req, true), "unknown");
    }
}
