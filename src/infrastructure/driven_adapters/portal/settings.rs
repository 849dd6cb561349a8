//! Portal connection settings

use std::fmt;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::infrastructure::driven_adapters::config::PortalConfig;
use crate::shared::errors::{DataPortalError, Result};

/// Caller supplied portal values; `None` falls back to configuration
#[derive(Clone, Default)]
pub struct PortalOptions {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<Zeroizing<String>>,
    pub timeout: Option<u64>,
}

impl fmt::Debug for PortalOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalOptions")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Fully resolved portal settings
#[derive(Clone)]
pub struct PortalSettings {
    pub url: String,
    pub username: String,
    pub password: Zeroizing<String>,
    pub timeout: Duration,
    pub token_expiration_minutes: u32,
}

impl fmt::Debug for PortalSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalSettings")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl PortalSettings {
    /// Merge explicit options over configuration values
    ///
    /// # Errors
    ///
    /// Returns `DataPortalError::PortalConnection` when the username,
    /// password or URL cannot be found.
    pub fn resolve(options: PortalOptions, config: &PortalConfig) -> Result<Self> {
        let username = non_blank(options.username.or_else(|| config.username.clone()))
            .ok_or_else(|| {
                DataPortalError::portal_connection("Portal username not specified").with_details(
                    "Set PSRC_PORTAL_USERNAME environment variable or provide username parameter",
                )
            })?;
        let password = options
            .password
            .or_else(|| config.password.clone())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                DataPortalError::portal_connection("Portal password not specified").with_details(
                    "Set PSRC_PORTAL_PASSWORD environment variable or provide password parameter",
                )
            })?;
        let url = non_blank(options.url.or_else(|| Some(config.url.clone()))).ok_or_else(|| {
            DataPortalError::portal_connection("Portal URL not specified")
                .with_details("Set PSRC_PORTAL_URL environment variable or provide url parameter")
        })?;

        Ok(Self {
            url: url.trim().trim_end_matches('/').to_string(),
            username,
            password,
            timeout: Duration::from_secs(options.timeout.unwrap_or(config.timeout)),
            token_expiration_minutes: config.token_expiration_minutes,
        })
    }
}
