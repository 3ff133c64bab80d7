use std::str::FromStr;

use anyhow::Context;
use common::Database;

use crate::ipfs::IpfsClient;
use crate::state::AppState;
use crate::storage::ObjectStorage;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

pub struct AppConfig {
    pub database_url: String,
    pub bind_address: String,
    pub port: u16,
    pub upload_dir: String,
    pub cdn_base_url: String,
    pub max_upload_bytes: usize,
    pub ipfs_api_url: Option<String>,
    pub ipfs_gateway_url: String,
    pub helio_webhook_token: Option<String>,
    pub payment_confirm_token: Option<String>,
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value `{}`", key, raw)),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").context("DATABASE_URL must be set")?;

        let cdn_base_url = get("CDN_BASE_URL").context("CDN_BASE_URL must be set")?;

        let bind_address = get("BIND_ADDRESS").unwrap_or_else(|| "127.0.0.1".to_string());

        let port = parse_or(get("PORT"), "PORT", 8080u16)?;

        let upload_dir = get("UPLOAD_DIR").unwrap_or_else(|| "./uploads".to_string());

        let max_upload_bytes = parse_or(
            get("MAX_UPLOAD_BYTES"),
            "MAX_UPLOAD_BYTES",
            DEFAULT_MAX_UPLOAD_BYTES,
        )?;

        let ipfs_api_url = get("IPFS_API_URL");

        let ipfs_gateway_url =
            get("IPFS_GATEWAY_URL").unwrap_or_else(|| "https://ipfs.io".to_string());

        let helio_webhook_token = get("HELIO_WEBHOOK_TOKEN");

        let payment_confirm_token = get("PAYMENT_CONFIRM_TOKEN");
        if payment_confirm_token.is_none() {
            log::warn!("PAYMENT_CONFIRM_TOKEN is not set, purchase confirmation is disabled");
        }

        Ok(Self {
            database_url,
            bind_address,
            port,
            upload_dir,
            cdn_base_url,
            max_upload_bytes,
            ipfs_api_url,
            ipfs_gateway_url,
            helio_webhook_token,
            payment_confirm_token,
        })
    }

    pub async fn create_app_state(&self) -> anyhow::Result<AppState> {
        let db = Database::new(&self.database_url)
            .await
            .context("Failed to initialize database")?;
        db.migrate().await?;
        log::info!("Database initialized successfully!");

        let storage = ObjectStorage::new(&self.upload_dir, &self.cdn_base_url)
            .await
            .context("Failed to initialize object storage")?;

        let ipfs = match self.ipfs_api_url.as_deref() {
            Some(api_url) => {
                log::info!("IPFS pinning enabled via {}", api_url);
                Some(
                    IpfsClient::new(api_url, &self.ipfs_gateway_url)
                        .context("Failed to initialize IPFS client")?,
                )
            }
            None => None,
        };

        Ok(AppState {
            db,
            storage,
            ipfs,
            max_upload_bytes: self.max_upload_bytes,
            helio_webhook_token: self.helio_webhook_token.clone(),
            payment_confirm_token: self.payment_confirm_token.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite://nwt.sqlite"),
            ("CDN_BASE_URL", "https://cdn.example.com"),
            ("IPFS_API_URL", ""),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.max_upload_bytes, 104_857_600);
        assert!(config.ipfs_api_url.is_none());
        assert!(config.helio_webhook_token.is_none());
        assert!(config.payment_confirm_token.is_none());
    }

    #[test]
    fn required_and_invalid_values() {
        assert!(AppConfig::from_lookup(lookup(&[("CDN_BASE_URL", "https://cdn")])).is_err());

        let err = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite://nwt.sqlite"),
            ("CDN_BASE_URL", "https://cdn"),
            ("PORT", "eighty"),
        ]))
        .err()
        .unwrap();
        assert!(err.to_string().contains("PORT"));
    }
}
