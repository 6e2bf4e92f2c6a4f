use clap::Parser;
use std::net::TcpListener;

use inventory_auth::auth::AuthService;
use inventory_auth::cli::{generate_invite, Cli, Commands};
use inventory_auth::configuration::get_configuration;
use inventory_auth::startup::run;
use inventory_auth::telemetry::init_telemetry;

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    tracing::error!("{}: {}", context, e);
    std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{}: {}", context, e))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();
    init_telemetry();

    let configuration =
        get_configuration().map_err(|e| startup_error("Failed to read configuration", e))?;
    tracing::info!("Configuration loaded successfully");

    match cli.command() {
        Commands::GenerateToken => {
            let invite = generate_invite(&configuration.storage)
                .map_err(|e| startup_error("Failed to issue invite", e))?;
            println!("Invite token: {}", invite.token);
            println!("Expires at:   {}", invite.expires_at.to_rfc3339());
            Ok(())
        }
        Commands::Serve => {
            let auth = AuthService::from_settings(&configuration)
                .map_err(|e| startup_error("Failed to initialize auth service", e))?;

            let address = configuration.application.address();
            let listener = TcpListener::bind(&address)?;
            tracing::info!(
                address = %address,
                environment = ?configuration.application.environment,
                "Server listening"
            );

            run(listener, auth, configuration.application)?.await
        }
    }
}
