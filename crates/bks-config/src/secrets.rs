//! Runtime secret resolution.
//!
//! Config YAML stores only env var NAMES (`notion.token_env`,
//! `sheets.access_token_env`). The binary calls [`resolve_secrets`] once at
//! startup and hands the result to adapter constructors. Errors name the
//! variable, never its value, and `Debug` output is redacted.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::Stage;

const DEFAULT_NOTION_TOKEN_ENV: &str = "NOTION_TOKEN";
const DEFAULT_SHEETS_TOKEN_ENV: &str = "SHEETS_ACCESS_TOKEN";

#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Notion integration token. `None` if the named env var was absent or empty.
    pub notion_token: Option<String>,
    /// Google Sheets OAuth access token.
    pub sheets_access_token: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "notion_token",
                &self.notion_token.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "sheets_access_token",
                &self.sheets_access_token.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Env var names as stored in the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretEnvNames {
    pub notion_token_var: String,
    pub sheets_access_token_var: String,
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Falls back to the default names when a pointer is absent.
pub fn env_names(config_json: &Value) -> SecretEnvNames {
    SecretEnvNames {
        notion_token_var: read_str_at(config_json, "/notion/token_env")
            .unwrap_or_else(|| DEFAULT_NOTION_TOKEN_ENV.to_string()),
        sheets_access_token_var: read_str_at(config_json, "/sheets/access_token_env")
            .unwrap_or_else(|| DEFAULT_SHEETS_TOKEN_ENV.to_string()),
    }
}

/// Resolve secrets for the stages about to run.
///
/// | Stage           | Required            |
/// |-----------------|---------------------|
/// | positions       | Notion token        |
/// | account_summary | Notion token        |
/// | trades          | Sheets access token |
///
/// Tokens for stages that will not run are resolved opportunistically.
pub fn resolve_secrets(config_json: &Value, stages: &[Stage]) -> Result<ResolvedSecrets> {
    let names = env_names(config_json);

    let notion_token = resolve_env(&names.notion_token_var);
    let sheets_access_token = resolve_env(&names.sheets_access_token_var);

    for stage in stages {
        match stage {
            Stage::Positions | Stage::AccountSummary if notion_token.is_none() => {
                bail!(
                    "SECRETS_MISSING stage={}: required env var '{}' \
                     (notion token) is not set or empty",
                    stage,
                    names.notion_token_var,
                );
            }
            Stage::Trades if sheets_access_token.is_none() => {
                bail!(
                    "SECRETS_MISSING stage={}: required env var '{}' \
                     (sheets access token) is not set or empty",
                    stage,
                    names.sheets_access_token_var,
                );
            }
            _ => {}
        }
    }

    Ok(ResolvedSecrets {
        notion_token,
        sheets_access_token,
    })
}
