use crate::error::AppError;

pub const DEFAULT_MAX_REVIEWS_PER_DOCUMENT: i64 = 3;
pub const DEFAULT_MAX_REVIEWS_PER_REVIEWER: i64 = 15;

/// Review caps applied when assigning documents and accepting responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ReviewLimits {
    pub per_document: i64,
    pub per_reviewer: i64,
}

impl Default for ReviewLimits {
    fn default() -> Self {
        Self {
            per_document: DEFAULT_MAX_REVIEWS_PER_DOCUMENT,
            per_reviewer: DEFAULT_MAX_REVIEWS_PER_REVIEWER,
        }
    }
}

/// Which password-gated panel a credential opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Panel {
    Reviewer,
    Admin,
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub host: String,
    pub port: u16,
    pub reviewer_password: Option<String>,
    pub admin_password: Option<String>,
    pub limits: ReviewLimits,
    pub workshop_title: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://data/data.db".to_string());

        let max_connections: u32 = std::env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "5001".to_string())
            .parse()
            .unwrap_or(5001);

        let limits = ReviewLimits {
            per_document: parse_limit(
                "MAX_REVIEWS_PER_DOCUMENT",
                std::env::var("MAX_REVIEWS_PER_DOCUMENT").ok().as_deref(),
                DEFAULT_MAX_REVIEWS_PER_DOCUMENT,
            )?,
            per_reviewer: parse_limit(
                "MAX_REVIEWS_PER_REVIEWER",
                std::env::var("MAX_REVIEWS_PER_REVIEWER").ok().as_deref(),
                DEFAULT_MAX_REVIEWS_PER_REVIEWER,
            )?,
        };

        let workshop_title = std::env::var("WORKSHOP_TITLE")
            .unwrap_or_else(|_| "Workshop Abstract Screening".to_string());

        Ok(Self {
            database_url,
            max_connections,
            host,
            port,
            reviewer_password: non_empty(std::env::var("WORKSHOP_LEVEL_1").ok()),
            admin_password: non_empty(std::env::var("WORKSHOP_LEVEL_0").ok()),
            limits,
            workshop_title,
        })
    }

    /// Checks a submitted password against the secret for `panel`.
    ///
    /// A panel whose secret is not configured can never be opened.
    pub fn verify_password(&self, panel: Panel, candidate: &str) -> bool {
        let secret = match panel {
            Panel::Reviewer => self.reviewer_password.as_deref(),
            Panel::Admin => self.admin_password.as_deref(),
        };
        matches!(secret, Some(s) if !candidate.is_empty() && s == candidate)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_limit(name: &str, raw: Option<&str>, default: i64) -> Result<i64, AppError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<i64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(AppError::Config(format!(
            "{} must be a positive integer, got {:?}",
            name, raw
        ))),
    }
}
