use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::policy::EnforcerOptions;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub server: Server,
    pub policy: Policy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// KDL file with operator check-string overrides
    pub overrides_file: Option<PathBuf>,
    /// Only the new default rules decide; deprecated defaults are ignored.
    #[serde(default)]
    pub enforce_new_defaults_only: bool,
    /// Deny tokens whose scope type is not listed on the rule.
    #[serde(default = "default_enforce_scope")]
    pub enforce_scope: bool,
}

fn default_enforce_scope() -> bool {
    true
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8181,
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            overrides_file: None,
            enforce_new_defaults_only: false,
            enforce_scope: default_enforce_scope(),
        }
    }
}

impl Policy {
    pub fn enforcer_options(&self) -> EnforcerOptions {
        EnforcerOptions {
            enforce_new_defaults_only: self.enforce_new_defaults_only,
            enforce_scope: self.enforce_scope,
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", Server::default().host)
            .into_diagnostic()?
            .set_default("server.port", Server::default().port)
            .into_diagnostic()?
            .set_default(
                "policy.enforce_new_defaults_only",
                Policy::default().enforce_new_defaults_only,
            )
            .into_diagnostic()?
            .set_default("policy.enforce_scope", Policy::default().enforce_scope)
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: VERDICT__SERVER__PORT=9090, etc.
        builder = builder.add_source(config::Environment::with_prefix("VERDICT").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        if let Some(file) = &s.policy.overrides_file {
            if file.is_relative() {
                s.policy.overrides_file = Some(std::env::current_dir().into_diagnostic()?.join(file));
            }
        }

        Ok(s)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
