use anyhow::Context;
use std::env;

/// Default bearer token lifetime (12 hours).
const DEFAULT_TOKEN_TTL_SECS: i64 = 12 * 3600;

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_key: String,
    pub from: String,
    pub admin_to: String,
}

#[derive(Debug, Clone)]
pub struct TranslateConfig {
    pub api_key: String,
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub struct CdnConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Bootstrap admin password, used until one is saved in settings.
    pub admin_password: String,
    /// HMAC key for admin tokens and confirm links.
    pub auth_secret: String,
    pub token_ttl_secs: i64,
    /// Externally reachable base URL, used to build confirm links.
    pub public_url: String,
    pub cors_origin: Option<String>,
    pub mail: Option<MailConfig>,
    pub translate: Option<TranslateConfig>,
    pub cdn: Option<CdnConfig>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let admin_password = required("ADMIN_PASSWORD")?;
        let auth_secret = required("AUTH_SECRET")?;

        let port = optional("PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("PORT must be a number")?;
        let token_ttl_secs = match optional("TOKEN_TTL_SECS") {
            Some(v) => v.parse().context("TOKEN_TTL_SECS must be a number")?,
            None => DEFAULT_TOKEN_TTL_SECS,
        };

        let mail = match (optional("RESEND_API_KEY"), optional("ADMIN_EMAIL")) {
            (Some(api_key), Some(admin_to)) => Some(MailConfig {
                api_key,
                from: optional("MAIL_FROM").unwrap_or_else(|| "booking@example.com".into()),
                admin_to,
            }),
            _ => {
                tracing::warn!("RESEND_API_KEY/ADMIN_EMAIL not set, lead notifications disabled");
                None
            }
        };

        let translate = match optional("DEEPL_API_KEY") {
            Some(api_key) => Some(TranslateConfig {
                api_key,
                api_url: optional("DEEPL_API_URL")
                    .unwrap_or_else(|| "https://api-free.deepl.com".into()),
            }),
            None => {
                tracing::warn!("DEEPL_API_KEY not set, content translation disabled");
                None
            }
        };

        let cdn = match (
            optional("CLOUDINARY_CLOUD_NAME"),
            optional("CLOUDINARY_API_KEY"),
            optional("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CdnConfig {
                cloud_name,
                api_key,
                api_secret,
                folder: optional("CLOUDINARY_FOLDER").unwrap_or_else(|| "photobooth".into()),
            }),
            _ => {
                tracing::warn!("Cloudinary credentials not set, image upload disabled");
                None
            }
        };

        Ok(Self {
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            database_url: optional("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:photobooth.db?mode=rwc".into()),
            admin_password,
            auth_secret,
            token_ttl_secs,
            public_url: optional("PUBLIC_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", port)),
            cors_origin: optional("CORS_ORIGIN"),
            mail,
            translate,
            cdn,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(key: &str) -> anyhow::Result<String> {
    optional(key).with_context(|| format!("{key} must be set"))
}
