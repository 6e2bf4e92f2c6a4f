use clap::{Parser, Subcommand};

use crate::configuration::StorageSettings;
use crate::error::AppError;
use crate::storage::{AuthStore, InviteToken};

/// Inventory auth server
#[derive(Debug, Parser)]
#[command(name = "inventory-auth", about = "Inventory auth server", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Issue an invite token into the configured ledger and print it.
    ///
    /// A running server keeps the ledger in memory; run this while it is
    /// stopped, or use `POST /api/generate-token` instead.
    GenerateToken,
}

impl Cli {
    pub fn command(&self) -> Commands {
        match &self.command {
            Some(Commands::GenerateToken) => Commands::GenerateToken,
            Some(Commands::Serve) | None => Commands::Serve,
        }
    }
}

/// Issues one invite into the ledger under `storage`
pub fn generate_invite(storage: &StorageSettings) -> Result<InviteToken, AppError> {
    let store = AuthStore::open(storage)?;
    let invite = store.issue_invite(chrono::Utc::now())?;
    tracing::info!(expires_at = %invite.expires_at, "Invite issued from the command line");
    Ok(invite)
}
