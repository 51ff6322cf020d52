//! Secrets configuration loaded from environment variables only.

use std::env;

/// Secrets loaded exclusively from environment variables.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    /// Dify workflow API key (env: DIFY_API_KEY)
    pub dify_api_key: Option<String>,
}

impl Secrets {
    /// Load secrets from environment variables.
    ///
    /// This function also loads .env file if present (for development),
    /// but production should rely on actual environment variables.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self::from_env_inner()
    }

    pub(crate) fn from_env_inner() -> Self {
        Self {
            dify_api_key: env::var("DIFY_API_KEY")
                .ok()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
        }
    }
}
