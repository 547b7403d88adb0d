use std::path::PathBuf;

use accessilist_core::config::{
    load_config, rate_limit_dir, resolve_accessilist_home, AccessilistConfig, Environment,
};
use anyhow::{Context, Result};
use clap::Args;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Command-line and environment overrides; anything unset falls back to
/// `<home>/config.toml`, then to built-in defaults.
#[derive(Debug, Clone, Default, Args)]
pub struct ServiceArgs {
    /// Address to listen on
    #[arg(long, env = "ACCESSILIST_BIND")]
    pub bind: Option<String>,
    /// Data home holding config.toml, sessions and rate-limit counters
    #[arg(long, env = "ACCESSILIST_HOME")]
    pub home: Option<PathBuf>,
    #[arg(long, env = "ACCESSILIST_SESSIONS_DIR")]
    pub sessions_dir: Option<PathBuf>,
    /// production, staging or local
    #[arg(long = "env", env = "ACCESSILIST_ENV")]
    pub environment: Option<String>,
    #[arg(long, env = "ACCESSILIST_CSRF_SECRET", hide_env_values = true)]
    pub csrf_secret: Option<String>,
    /// Take the client address from `x-forwarded-for` (only behind a reverse proxy)
    #[arg(long, env = "ACCESSILIST_TRUST_PROXY")]
    pub trust_proxy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    pub bind: String,
    pub home: PathBuf,
    pub sessions_dir: PathBuf,
    pub rate_limit_dir: PathBuf,
    pub environment: Environment,
    pub csrf_secret: Option<String>,
    pub trust_proxy: bool,
}

impl ServiceSettings {
    pub fn resolve(args: &ServiceArgs) -> Result<Self> {
        let home = match &args.home {
            Some(home) => home.clone(),
            None => resolve_accessilist_home()?,
        };
        let file = load_config(&home)
            .with_context(|| format!("loading config from {}", home.display()))?
            .unwrap_or_default();
        Self::layer(args, home, &file)
    }

    fn layer(args: &ServiceArgs, home: PathBuf, file: &AccessilistConfig) -> Result<Self> {
        let environment = match args.environment.as_deref() {
            Some(value) => Environment::parse(value)?,
            None => file.environment(),
        };
        let sessions_dir = args
            .sessions_dir
            .clone()
            .unwrap_or_else(|| file.sessions_dir(&home));
        let bind = args
            .bind
            .clone()
            .or_else(|| file.bind.clone())
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let csrf_secret = args
            .csrf_secret
            .clone()
            .or_else(|| file.csrf_secret.clone())
            .filter(|secret| !secret.trim().is_empty());
        Ok(Self {
            bind,
            rate_limit_dir: rate_limit_dir(&home),
            sessions_dir,
            environment,
            csrf_secret,
            trust_proxy: args.trust_proxy,
            home,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accessilist_core::config::write_config;
    use tempfile::TempDir;

    #[test]
    fn flags_override_config_file() {
        let temp = TempDir::new().expect("tempdir");
        write_config(
            temp.path(),
            &AccessilistConfig {
                sessions_dir: Some("data".to_string()),
                environment: Some(Environment::Staging),
                csrf_secret: Some("from-file".to_string()),
                bind: Some("0.0.0.0:9000".to_string()),
            },
        )
        .expect("write config");

        let args = ServiceArgs {
            home: Some(temp.path().to_path_buf()),
            environment: Some("local".to_string()),
            ..ServiceArgs::default()
        };
        let settings = ServiceSettings::resolve(&args).expect("resolve");
        assert_eq!(settings.environment, Environment::Local);
        assert_eq!(settings.sessions_dir, temp.path().join("data"));
        assert_eq!(settings.bind, "0.0.0.0:9000");
        assert_eq!(settings.csrf_secret.as_deref(), Some("from-file"));
        assert_eq!(settings.rate_limit_dir, temp.path().join("rate-limits"));
    }

    #[test]
    fn defaults_apply_without_config_file() {
        let temp = TempDir::new().expect("tempdir");
        let args = ServiceArgs {
            home: Some(temp.path().to_path_buf()),
            ..ServiceArgs::default()
        };
        let settings = ServiceSettings::resolve(&args).expect("resolve");
        assert_eq!(settings.bind, DEFAULT_BIND);
        assert_eq!(settings.environment, Environment::Production);
        assert_eq!(settings.sessions_dir, temp.path().join("sessions"));
        assert!(settings.csrf_secret.is_none());
        assert!(!settings.trust_proxy);
    }

    #[test]
    fn unknown_environment_is_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let args = ServiceArgs {
            home: Some(temp.path().to_path_buf()),
            environment: Some("qa".to_string()),
            ..ServiceArgs::default()
        };
        assert!(ServiceSettings::resolve(&args).is_err());
    }
}
