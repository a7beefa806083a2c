use std::env;

use chrono::Duration;
use log::*;
use mpg_common::Secret;

const DEFAULT_MPG_HOST: &str = "127.0.0.1";
const DEFAULT_MPG_PORT: u16 = 8460;
/// How long an unfinished payment intent may linger before the expiry worker
/// fails it. Generous compared to the ~5 minute confirmation window so a slow
/// chain never gets cut off.
const DEFAULT_PAYMENT_EXPIRY: Duration = Duration::hours(2);
const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::hours(24);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Shared secret the identity service signs login tokens with; also signs
    /// the access tokens this server issues.
    pub jwt_secret: Secret<String>,
    pub access_token_ttl: Duration,
    /// Shared secret for the wallet network's webhook signatures.
    pub webhook_secret: Secret<String>,
    /// If false, webhook signatures are not checked. **DANGER**: only for
    /// local development.
    pub webhook_signature_checks: bool,
    /// Unfinished payment intents older than this are failed by the expiry
    /// worker.
    pub payment_expiry: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MPG_HOST.to_string(),
            port: DEFAULT_MPG_PORT,
            database_url: String::default(),
            jwt_secret: Secret::default(),
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            webhook_secret: Secret::default(),
            webhook_signature_checks: true,
            payment_expiry: DEFAULT_PAYMENT_EXPIRY,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MPG_HOST").ok().unwrap_or_else(|| DEFAULT_MPG_HOST.into());
        let port = env::var("MPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for MPG_PORT. {e} Using the default, {DEFAULT_MPG_PORT}, instead."
                    );
                    DEFAULT_MPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_MPG_PORT);
        let database_url = env::var("MPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ MPG_DATABASE_URL is not set. Please set it to the URL for the gateway database.");
            String::default()
        });
        let jwt_secret = env::var("MPG_JWT_SECRET").map(Secret::new).unwrap_or_else(|_| {
            warn!("🪛️ MPG_JWT_SECRET is not set. Access tokens will not survive a restart.");
            Secret::default()
        });
        let webhook_secret = env::var("MPG_WEBHOOK_SECRET").map(Secret::new).unwrap_or_else(|_| {
            warn!("🪛️ MPG_WEBHOOK_SECRET is not set. Webhook calls will fail their signature check.");
            Secret::default()
        });
        let webhook_signature_checks =
            !env::var("MPG_DISABLE_WEBHOOK_SIGNATURE").map(|s| &s == "1" || &s == "true").unwrap_or(false);
        if !webhook_signature_checks {
            warn!("🪛️ Webhook signature checks are DISABLED. Never run like this in production.");
        }
        let payment_expiry = duration_from_env("MPG_PAYMENT_EXPIRY_HOURS", DEFAULT_PAYMENT_EXPIRY);
        let access_token_ttl = duration_from_env("MPG_ACCESS_TOKEN_TTL_HOURS", DEFAULT_ACCESS_TOKEN_TTL);
        Self {
            host,
            port,
            database_url,
            jwt_secret,
            access_token_ttl,
            webhook_secret,
            webhook_signature_checks,
            payment_expiry,
        }
    }
}

fn duration_from_env(var: &str, default: Duration) -> Duration {
    match env::var(var) {
        Ok(s) => match s.parse::<i64>() {
            Ok(hours) if hours > 0 => Duration::hours(hours),
            _ => {
                error!("🪛️ {s} is not a valid value for {var}. Using the default ({} hours).", default.num_hours());
                default
            },
        },
        Err(_) => default,
    }
}
