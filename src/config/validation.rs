use crate::config::types::{
    Config, HarvestConfig, OutputConfig, RemoteConfig, StateConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Largest page a Jira search endpoint will honor
const MAX_PAGE_SIZE: u32 = 1000;

/// Validates the entire configuration
///
/// Checks every section in turn and stops at the first problem. Command-line
/// overrides are applied before this runs, so it sees the effective settings.
///
/// # Arguments
///
/// * `config` - The configuration to validate
///
/// # Returns
///
/// * `Ok(())` - The configuration is usable
/// * `Err(ConfigError::Validation)` - A value is out of range or empty
/// * `Err(ConfigError::InvalidUrl)` - The base URL or contact URL does not parse
///
/// # Example
///
/// ```
/// use jira_harvest::config::{validate, Config};
///
/// let mut config = Config::default();
/// assert!(validate(&config).is_ok());
///
/// config.harvest.page_size = 0;
/// assert!(validate(&config).is_err());
/// ```
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_remote_config(&config.remote)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_harvest_config(&config.harvest)?;
    validate_state_config(&config.state)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates remote endpoint and retry settings
fn validate_remote_config(config: &RemoteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.max_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max-delay-ms ({}) must not be below base-delay-ms ({})",
            config.max_delay_ms, config.base_delay_ms
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.client_name.is_empty() {
        return Err(ConfigError::Validation(
            "client-name cannot be empty".to_string(),
        ));
    }

    if !config
        .client_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "client-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.client_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates pagination and batching settings
fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    if config.projects.is_empty() {
        return Err(ConfigError::Validation(
            "at least one project is required".to_string(),
        ));
    }

    for project in &config.projects {
        validate_project_key(project)?;
    }

    if config.page_size < 1 || config.page_size > MAX_PAGE_SIZE {
        return Err(ConfigError::Validation(format!(
            "page-size must be between 1 and {}, got {}",
            MAX_PAGE_SIZE, config.page_size
        )));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(
            "batch-size must be >= 1".to_string(),
        ));
    }

    if config.failure_threshold < 1 {
        return Err(ConfigError::Validation(
            "failure-threshold must be >= 1".to_string(),
        ));
    }

    if !config.jql.contains("{project}") {
        return Err(ConfigError::Validation(format!(
            "jql template must contain '{{project}}', got '{}'",
            config.jql
        )));
    }

    Ok(())
}

/// Validates a project key: non-empty, alphanumeric plus '_' and '-'
fn validate_project_key(key: &str) -> Result<(), ConfigError> {
    if key.is_empty() {
        return Err(ConfigError::Validation(
            "project key cannot be empty".to_string(),
        ));
    }

    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "project key '{}' contains invalid characters",
            key
        )));
    }

    Ok(())
}

fn validate_state_config(config: &StateConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "state path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "output path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact-email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_project_key() {
        assert!(validate_project_key("SPARK").is_ok());
        assert!(validate_project_key("MY_PROJ-2").is_ok());

        assert!(validate_project_key("").is_err());
        assert!(validate_project_key("SPARK OR 1=1").is_err());
        assert!(validate_project_key("a\"b").is_err());
    }

    #[test]
    fn test_page_size_bounds() {
        let mut config = Config::default();
        config.harvest.page_size = 0;
        assert!(validate(&config).is_err());

        config.harvest.page_size = 1001;
        assert!(validate(&config).is_err());

        config.harvest.page_size = 1000;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_jql_requires_placeholder() {
        let mut config = Config::default();
        config.harvest.jql = "ORDER BY created".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_base_url_scheme() {
        let mut config = Config::default();
        config.remote.base_url = "ftp://jira.example.com/".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));

        config.remote.base_url = "not a url".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));

        config.remote.base_url = "http://127.0.0.1:8080/rest/api/2/".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = Config::default();
        config.remote.max_attempts = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }
}
