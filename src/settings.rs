use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;

/// Default Microsoft identity platform tenant segment
pub const DEFAULT_TENANT: &str = "common";

/// OIDC discovery document for organizational (work/school) accounts
pub const ORGANIZATIONS_OIDC_CONFIG_URL: &str =
    "https://login.microsoftonline.com/organizations/v2.0/.well-known/openid-configuration";

/// Tenant-independent signing keys used for consumer and multi-tenant tokens
pub const COMMON_JWKS_URL: &str =
    "https://login.microsoftonline.com/common/discovery/v2.0/keys";

/// Microsoft Graph profile endpoint used to build the identity record
pub const DEFAULT_USERINFO_ENDPOINT: &str = "https://graph.microsoft.com/v1.0/me";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphAuthSettings {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Tenant segment of the login endpoints (`common`, `organizations`, or a tenant id)
    #[serde(default = "default_tenant")]
    pub tenant: String,

    // Direct values (can be overridden by environment variables)
    pub client_id: Option<String>,
    pub client_secret: Option<String>,

    // Environment variable names for overrides
    pub client_id_env: Option<String>,
    pub client_secret_env: Option<String>,

    pub redirect_uri: Option<String>,

    /// Raw requested scope string; normalized before use
    pub scope: Option<String>,

    /// Additional client ids accepted in the `aud` claim of passed-in tokens
    #[serde(default)]
    pub authorized_client_ids: Vec<String>,

    /// Domain verification policy for the nOAuth mitigation
    #[serde(default)]
    pub skip_domain_verification: DomainVerificationPolicy,

    // Endpoint overrides (sovereign clouds, tests); tenant-derived defaults otherwise
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub userinfo_endpoint: Option<String>,
    pub oidc_config_url: Option<String>,
    pub common_jwks_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Helper functions for serde defaults
fn default_tenant() -> String {
    DEFAULT_TENANT.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Policy for the email-domain verification gate
///
/// Deserializes from the configuration forms `false` (enforce, the default),
/// `true` (skip entirely), or a list of exempt domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainVerificationPolicy {
    /// Every login must pass domain verification
    Enforce,
    /// Verification disabled globally (NOT RECOMMENDED)
    SkipAll,
    /// Verification skipped only for the listed email domains
    SkipListed(HashSet<String>),
}

impl Default for DomainVerificationPolicy {
    fn default() -> Self {
        Self::Enforce
    }
}

impl DomainVerificationPolicy {
    /// Whether verification is disabled for every domain
    #[must_use]
    pub fn skips_all(&self) -> bool {
        matches!(self, Self::SkipAll)
    }

    /// Whether the given email domain is explicitly exempt
    #[must_use]
    pub fn exempts(&self, domain: Option<&str>) -> bool {
        match (self, domain) {
            (Self::SkipListed(domains), Some(domain)) => domains.contains(domain),
            _ => false,
        }
    }
}

impl<'de> Deserialize<'de> for DomainVerificationPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Domains(Vec<String>),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Flag(true) => Self::SkipAll,
            Repr::Flag(false) => Self::Enforce,
            Repr::Domains(domains) => Self::SkipListed(domains.into_iter().collect()),
        })
    }
}

impl Serialize for DomainVerificationPolicy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Enforce => serializer.serialize_bool(false),
            Self::SkipAll => serializer.serialize_bool(true),
            Self::SkipListed(domains) => {
                let mut sorted: Vec<&String> = domains.iter().collect();
                sorted.sort();
                sorted.serialize(serializer)
            }
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            tenant: DEFAULT_TENANT.to_string(),
            client_id: None,
            client_secret: None,
            client_id_env: None,
            client_secret_env: None,
            redirect_uri: None,
            scope: None,
            authorized_client_ids: Vec::new(),
            skip_domain_verification: DomainVerificationPolicy::default(),
            authorization_endpoint: None,
            token_endpoint: None,
            userinfo_endpoint: None,
            oidc_config_url: None,
            common_jwks_url: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl GraphAuthSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Environment initialization fails
    /// - Settings file cannot be read or parsed
    /// - TOML parsing fails
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        // Initialize environment and logging
        Self::initialize_environment()?;

        // Load base settings from TOML or defaults
        let mut settings = Self::load_base_settings()?;

        // Apply environment variable overrides
        Self::apply_env_overrides(&mut settings);

        Ok(settings)
    }

    /// Initialize environment variables and logging
    ///
    /// # Errors
    ///
    /// Returns an error if logger initialization fails
    fn initialize_environment() -> Result<(), Box<dyn std::error::Error>> {
        Self::load_env_file();
        env_logger::try_init()?;
        Ok(())
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `GRAPHAUTH_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read
    /// - TOML parsing fails
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = std::path::PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            let toml_content = fs::read_to_string(&default_config_path)?;
            settings = basic_toml::from_str(&toml_content)?;
            log::info!(
                "Loaded base settings from {}",
                default_config_path.display()
            );
        }

        // If GRAPHAUTH_SECRETS_DIR is set and contains Settings.toml, override with those settings
        if let Ok(secrets_dir) = std::env::var("GRAPHAUTH_SECRETS_DIR") {
            let secrets_path = std::path::Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                let secrets_toml_content = fs::read_to_string(&secrets_path)?;
                let secrets_settings: Self = basic_toml::from_str(&secrets_toml_content)?;

                log::info!("Overriding settings from {}", secrets_path.display());

                settings = secrets_settings;
            } else {
                log::info!(
                    "GRAPHAUTH_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_provider_env_overrides(&mut settings.provider);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    /// Apply environment overrides for provider settings
    fn apply_provider_env_overrides(provider: &mut ProviderSettings) {
        if let Ok(tenant) = std::env::var("GRAPHAUTH_TENANT") {
            provider.tenant = tenant;
        }
        if let Ok(redirect_uri) = std::env::var("GRAPHAUTH_REDIRECT_URI") {
            provider.redirect_uri = Some(redirect_uri);
        }
        if let Ok(scope) = std::env::var("GRAPHAUTH_SCOPE") {
            provider.scope = Some(scope);
        }
    }

    /// Apply environment overrides for logging settings
    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }
}

impl ProviderSettings {
    /// Get the client ID, checking environment variable first, then falling back to direct value
    #[must_use]
    pub fn get_client_id(&self) -> Option<String> {
        if let Some(env_var) = &self.client_id_env {
            if let Ok(value) = std::env::var(env_var) {
                return Some(value);
            }
        }
        self.client_id.clone()
    }

    /// Get the client secret, checking environment variable first, then falling back to direct value
    #[must_use]
    pub fn get_client_secret(&self) -> Option<String> {
        if let Some(env_var) = &self.client_secret_env {
            if let Ok(value) = std::env::var(env_var) {
                return Some(value);
            }
        }
        self.client_secret.clone()
    }

    /// Authorization endpoint, derived from the tenant unless overridden
    #[must_use]
    pub fn authorization_endpoint(&self) -> String {
        self.authorization_endpoint.clone().unwrap_or_else(|| {
            format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/authorize",
                self.tenant
            )
        })
    }

    /// Token endpoint, derived from the tenant unless overridden
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        self.token_endpoint.clone().unwrap_or_else(|| {
            format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
                self.tenant
            )
        })
    }

    /// Profile endpoint queried to build the identity record
    #[must_use]
    pub fn userinfo_endpoint(&self) -> String {
        self.userinfo_endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_USERINFO_ENDPOINT.to_string())
    }

    /// Discovery document consulted during domain verification
    #[must_use]
    pub fn oidc_config_url(&self) -> String {
        self.oidc_config_url
            .clone()
            .unwrap_or_else(|| ORGANIZATIONS_OIDC_CONFIG_URL.to_string())
    }

    /// Fallback key set for tokens signed by the tenant-independent issuer
    #[must_use]
    pub fn common_jwks_url(&self) -> String {
        self.common_jwks_url
            .clone()
            .unwrap_or_else(|| COMMON_JWKS_URL.to_string())
    }
}
