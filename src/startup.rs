use actix_web::dev::Server;
use actix_web::{error::JsonPayloadError, middleware::Logger, web, App, HttpRequest, HttpServer};
use std::net::TcpListener;

use crate::auth::AuthService;
use crate::configuration::ApplicationSettings;
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{generate_token, get_current_user, health_check, login, register};

/// Malformed or oversized JSON bodies get the same `{error, code}` shape
/// as every other rejection
fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    tracing::debug!(error = %err, "Rejected request body");
    AppError::Validation(ValidationError::InvalidFormat("request body".to_string())).into()
}

pub fn run(
    listener: TcpListener,
    auth: AuthService,
    application: ApplicationSettings,
) -> Result<Server, std::io::Error> {
    let auth = web::Data::new(auth);
    let application = web::Data::new(application);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(auth.clone())
            .app_data(application.clone())
            .app_data(
                web::JsonConfig::default()
                    .limit(16 * 1024)
                    .error_handler(json_error_handler),
            )

            // Public routes (no authentication required)
            .route("/health_check", web::get().to(health_check))
            .route("/api/register", web::post().to(register))
            .route("/api/login", web::post().to(login))

            // Protected routes (require JWT authentication)
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(auth.clone()))
                    .route("/me", web::get().to(get_current_user))
                    .route("/generate-token", web::post().to(generate_token)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
