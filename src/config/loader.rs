use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::types::Config;

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        // Exactly one account mode must be active
        match (&self.account, &self.accounts) {
            (Some(_), Some(_)) => {
                anyhow::bail!("'account' and 'accounts' are mutually exclusive")
            }
            (None, None) => {
                anyhow::bail!("either 'account' or 'accounts' must be configured")
            }
            _ => {}
        }

        let web_path = &self.gateway.web_path;
        if !web_path.starts_with('/') || web_path.len() < 2 {
            anyhow::bail!("gateway.web_path must be a path below the root, e.g. /smssync");
        }
        if web_path.ends_with('/') {
            anyhow::bail!("gateway.web_path must not end with '/'");
        }

        if self.gateway.max_queued_per_account == 0 {
            anyhow::bail!("gateway.max_queued_per_account must be positive");
        }

        if let Some(account) = &self.account {
            validate_account(
                "account",
                &account.id,
                &account.secret,
                account.accept_any_secret,
                &account.dialing_code,
            )?;
        }

        if let Some(accounts) = &self.accounts {
            if accounts.is_empty() {
                anyhow::bail!("'accounts' must define at least one account");
            }
            for (id, entry) in accounts {
                validate_account(
                    &format!("accounts.{}", id),
                    id,
                    &entry.secret,
                    entry.accept_any_secret,
                    &entry.dialing_code,
                )?;
            }
        }

        info!("configuration validated successfully");
        Ok(())
    }
}

fn validate_account(
    label: &str,
    id: &str,
    secret: &str,
    accept_any_secret: bool,
    dialing_code: &str,
) -> Result<()> {
    if id.is_empty() {
        anyhow::bail!("{}: account id must not be empty", label);
    }
    if id.contains('/') {
        anyhow::bail!("{}: account id must not contain '/'", label);
    }

    // An empty secret silently matching everything has burnt people
    // before; accepting all comers must be spelled out.
    if secret.is_empty() && !accept_any_secret {
        anyhow::bail!(
            "{}: empty secret requires 'accept_any_secret: true'",
            label
        );
    }
    if !secret.is_empty() && accept_any_secret {
        anyhow::bail!(
            "{}: 'accept_any_secret' is only valid with an empty secret",
            label
        );
    }

    if !dialing_code.starts_with('+')
        || dialing_code.len() < 2
        || !dialing_code[1..].chars().all(|c| c.is_ascii_digit())
    {
        anyhow::bail!("{}: dialing_code must be '+' followed by digits", label);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_minimal_single_account_config() {
        let yaml = r#"
account:
  secret: "topsecret"
  dialing_code: "+27"
"#;

        let config = Config::from_yaml(yaml).unwrap();
        let account = config.account.unwrap();
        assert_eq!(account.id, "default");
        assert_eq!(account.secret, "topsecret");
        assert_eq!(config.server.address, "0.0.0.0:9080".parse().unwrap());
        assert_eq!(config.gateway.web_path, "/smssync");
        assert_eq!(config.gateway.reply_delay, Duration::from_millis(500));
        assert_eq!(config.gateway.max_queued_per_account, 1000);
    }

    #[test]
    fn test_multi_account_config() {
        let yaml = r#"
gateway:
  web_path: /gateway
  reply_delay: 2s

accounts:
  account1:
    secret: "secret1"
    dialing_code: "+27"
  account2:
    secret: "secret2"
    dialing_code: "+258"
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.gateway.web_path, "/gateway");
        assert_eq!(config.gateway.reply_delay, Duration::from_secs(2));
        assert_eq!(config.accounts.unwrap().len(), 2);
    }

    #[test]
    fn test_both_account_modes_rejected() {
        let yaml = r#"
account:
  secret: "s"
  dialing_code: "+27"

accounts:
  other:
    secret: "s"
    dialing_code: "+27"
"#;

        let result = Config::from_yaml(yaml);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("mutually exclusive"));
    }

    #[test]
    fn test_missing_account_mode_rejected() {
        let result = Config::from_yaml("gateway:\n  web_path: /smssync\n");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("'account' or 'accounts'"));
    }

    #[test]
    fn test_empty_secret_requires_explicit_flag() {
        let yaml = r#"
account:
  dialing_code: "+27"
"#;

        let result = Config::from_yaml(yaml);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("accept_any_secret"));
    }

    #[test]
    fn test_empty_secret_with_flag_accepted() {
        let yaml = r#"
account:
  accept_any_secret: true
  dialing_code: "+27"
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert!(config.account.unwrap().accept_any_secret);
    }

    #[test]
    fn test_accept_any_with_secret_rejected() {
        let yaml = r#"
account:
  secret: "topsecret"
  accept_any_secret: true
  dialing_code: "+27"
"#;

        let result = Config::from_yaml(yaml);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("only valid with an empty secret"));
    }

    #[test]
    fn test_bad_web_path_rejected() {
        for web_path in ["smssync", "/smssync/", "/"] {
            let yaml = format!(
                "gateway:\n  web_path: {}\naccount:\n  secret: s\n  dialing_code: \"+27\"\n",
                web_path
            );
            assert!(Config::from_yaml(&yaml).is_err(), "{}", web_path);
        }
    }

    #[test]
    fn test_bad_dialing_code_rejected() {
        for dialing_code in ["27", "+", "+2a7", ""] {
            let yaml = format!(
                "account:\n  secret: s\n  dialing_code: \"{}\"\n",
                dialing_code
            );
            assert!(Config::from_yaml(&yaml).is_err(), "{}", dialing_code);
        }
    }

    #[test]
    fn test_empty_accounts_rejected() {
        let result = Config::from_yaml("accounts: {}\n");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("at least one account"));
    }

    #[test]
    fn test_zero_queue_bound_rejected() {
        let yaml = r#"
gateway:
  max_queued_per_account: 0

account:
  secret: "s"
  dialing_code: "+27"
"#;

        let result = Config::from_yaml(yaml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("must be positive"));
    }
}
