use std::path::PathBuf;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::ConfigError;

/// Shortest signing secret accepted outside local development
pub const MIN_SECRET_LENGTH: usize = 32;
/// Session token lifetime: 24 hours
pub const DEFAULT_TOKEN_EXPIRY_SECONDS: i64 = 24 * 60 * 60;
/// bcrypt work factor used for new password hashes
pub const DEFAULT_HASH_COST: u32 = 10;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub jwt: JwtSettings,
    #[serde(default)]
    pub password: PasswordSettings,
}

#[derive(serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Production,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub environment: Environment,
    /// Honor `X-Forwarded-For` when keying login attempts. Only enable
    /// behind a reverse proxy that overwrites the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl ApplicationSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Where the credential store and invite ledger live
#[derive(serde::Deserialize, Clone, Debug)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
    pub users_file: String,
    pub tokens_file: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            users_file: "users.json".to_string(),
            tokens_file: "tokens.json".to_string(),
        }
    }
}

impl StorageSettings {
    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join(&self.users_file)
    }

    pub fn tokens_path(&self) -> PathBuf {
        self.data_dir.join(&self.tokens_file)
    }
}

/// JWT authentication settings
#[derive(serde::Deserialize, Clone, Debug)]
pub struct JwtSettings {
    /// HS256 signing secret. Required outside local development.
    pub secret: Option<String>,
    pub issuer: String,
    pub expiry_seconds: i64, // 86400 = 24 hours
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: None,
            issuer: "inventory-auth".to_string(),
            expiry_seconds: DEFAULT_TOKEN_EXPIRY_SECONDS,
        }
    }
}

impl JwtSettings {
    /// Resolves the signing secret for `environment`.
    ///
    /// A configured secret is used as is (and must be long enough outside
    /// local). Without one, local development gets a random per-process
    /// secret and every other environment refuses to start.
    pub fn signing_secret(&self, environment: Environment) -> Result<Vec<u8>, ConfigError> {
        match (&self.secret, environment) {
            (Some(secret), _) if secret.is_empty() => Err(ConfigError::InvalidValue(
                "jwt.secret must not be empty".to_string(),
            )),
            (Some(secret), Environment::Production) if secret.len() < MIN_SECRET_LENGTH => {
                Err(ConfigError::InvalidValue(format!(
                    "jwt.secret must be at least {} bytes",
                    MIN_SECRET_LENGTH
                )))
            }
            (Some(secret), _) => Ok(secret.as_bytes().to_vec()),
            (None, Environment::Local) => {
                tracing::warn!(
                    "No JWT secret configured; using a random per-process secret. \
                     Sessions will not survive a restart."
                );
                let mut secret = vec![0u8; 64];
                OsRng.fill_bytes(&mut secret);
                Ok(secret)
            }
            (None, _) => Err(ConfigError::MissingRequired(
                "jwt.secret (set JWT_SECRET)".to_string(),
            )),
        }
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct PasswordSettings {
    pub hash_cost: u32,
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            hash_cost: DEFAULT_HASH_COST,
        }
    }
}

/// Reads `configuration.{yaml,toml,json}` from the working directory,
/// then `APP_`-prefixed environment variables (`APP_APPLICATION__PORT`),
/// then `JWT_SECRET`.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .set_default("application.port", 3000)?
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let mut settings = settings.try_deserialize::<Settings>()?;
    if let Ok(secret) = std::env::var("JWT_SECRET") {
        settings.jwt.secret = Some(secret);
    }
    Ok(settings)
}
