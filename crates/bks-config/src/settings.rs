//! Typed view of the effective config.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use bks_portfolio::{GroupBy, MultiplierTable};
use bks_schemas::{PriceWindow, SecType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit of work in a synchronization run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Positions,
    Trades,
    AccountSummary,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Positions, Stage::Trades, Stage::AccountSummary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Positions => "positions",
            Stage::Trades => "trades",
            Stage::AccountSummary => "account_summary",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageToggles {
    pub positions: bool,
    pub trades: bool,
    pub account_summary: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            positions: true,
            trades: true,
            account_summary: true,
        }
    }
}

impl StageToggles {
    pub fn is_enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Positions => self.positions,
            Stage::Trades => self.trades,
            Stage::AccountSummary => self.account_summary,
        }
    }

    /// Enabled stages in run order. `only` narrows the set to one stage,
    /// overriding its toggle.
    pub fn enabled(&self, only: Option<Stage>) -> Vec<Stage> {
        match only {
            Some(stage) => vec![stage],
            None => Stage::ALL
                .into_iter()
                .filter(|s| self.is_enabled(*s))
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionsSettings {
    /// Contract multiplier per sec type code.
    pub sec_types_with_multiplier: BTreeMap<String, i64>,
    pub price_window: PriceWindow,
    /// Run a what-if simulation per position (one extra session call each).
    pub estimate_margin: bool,
}

impl Default for PositionsSettings {
    fn default() -> Self {
        Self {
            sec_types_with_multiplier: [("OPT".to_string(), 100)].into_iter().collect(),
            price_window: PriceWindow::default(),
            estimate_margin: false,
        }
    }
}

impl PositionsSettings {
    pub fn multipliers(&self) -> MultiplierTable {
        MultiplierTable::from_entries(
            self.sec_types_with_multiplier
                .iter()
                .map(|(code, m)| (code.as_str(), *m)),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotionSettings {
    pub base_url: String,
    /// NAME of the env var holding the integration token.
    pub token_env: String,
    pub positions_database: Option<String>,
    pub key_property: String,
    pub page_size: u32,
    pub account_summary_page: Option<String>,
    pub account_summary_heading: String,
}

impl Default for NotionSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.notion.com".to_string(),
            token_env: "NOTION_TOKEN".to_string(),
            positions_database: None,
            key_property: "position_id".to_string(),
            page_size: 100,
            account_summary_page: None,
            account_summary_heading: "account summary".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsSettings {
    pub base_url: String,
    /// NAME of the env var holding the OAuth access token.
    pub access_token_env: String,
    pub spreadsheet_id: Option<String>,
    pub sheet: String,
    pub page_size: u32,
}

impl Default for SheetsSettings {
    fn default() -> Self {
        Self {
            base_url: "https://sheets.googleapis.com".to_string(),
            access_token_env: "SHEETS_ACCESS_TOKEN".to_string(),
            spreadsheet_id: None,
            sheet: "IB order history".to_string(),
            page_size: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradesSettings {
    pub group_by: GroupBy,
    /// Only fills of these classes become trade records.
    pub sec_types: Vec<SecType>,
}

impl Default for TradesSettings {
    fn default() -> Self {
        Self {
            group_by: GroupBy::default(),
            sec_types: vec![SecType::Stock],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub account: String,
    #[serde(default)]
    pub stages: StageToggles,
    #[serde(default)]
    pub positions: PositionsSettings,
    #[serde(default)]
    pub notion: NotionSettings,
    #[serde(default)]
    pub sheets: SheetsSettings,
    #[serde(default)]
    pub trades: TradesSettings,
}

const NOTION_MAX_PAGE_SIZE: u32 = 100;

impl SyncConfig {
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: SyncConfig = serde_json::from_value(config_json.clone())
            .context("CONFIG_INVALID: effective config does not match the sync schema")?;
        if cfg.account.trim().is_empty() {
            bail!("CONFIG_INVALID: /account must not be empty");
        }
        Ok(cfg)
    }

    /// Check that every setting the given stages need is present.
    pub fn validate_for(&self, stages: &[Stage]) -> Result<()> {
        for stage in stages {
            match stage {
                Stage::Positions => {
                    require(&self.notion.positions_database, "/notion/positions_database", *stage)?;
                    if self.notion.key_property.trim().is_empty() {
                        bail!("CONFIG_INVALID stage=positions: /notion/key_property is empty");
                    }
                    if !(1..=NOTION_MAX_PAGE_SIZE).contains(&self.notion.page_size) {
                        bail!(
                            "CONFIG_INVALID stage=positions: /notion/page_size must be 1..={}, got {}",
                            NOTION_MAX_PAGE_SIZE,
                            self.notion.page_size
                        );
                    }
                    if let Some((code, m)) = self
                        .positions
                        .sec_types_with_multiplier
                        .iter()
                        .find(|(_, m)| **m <= 0)
                    {
                        bail!(
                            "CONFIG_INVALID stage=positions: multiplier for {code} must be positive, got {m}"
                        );
                    }
                }
                Stage::Trades => {
                    require(&self.sheets.spreadsheet_id, "/sheets/spreadsheet_id", *stage)?;
                    if self.sheets.sheet.trim().is_empty() {
                        bail!("CONFIG_INVALID stage=trades: /sheets/sheet is empty");
                    }
                    if self.sheets.page_size == 0 {
                        bail!("CONFIG_INVALID stage=trades: /sheets/page_size must be positive");
                    }
                }
                Stage::AccountSummary => {
                    require(
                        &self.notion.account_summary_page,
                        "/notion/account_summary_page",
                        *stage,
                    )?;
                }
            }
        }
        Ok(())
    }
}

fn require(value: &Option<String>, pointer: &str, stage: Stage) -> Result<()> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(()),
        _ => bail!("CONFIG_INVALID stage={stage}: {pointer} is required"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_overrides_toggles() {
        let toggles = StageToggles {
            positions: false,
            trades: true,
            account_summary: false,
        };
        assert_eq!(toggles.enabled(None), vec![Stage::Trades]);
        assert_eq!(
            toggles.enabled(Some(Stage::Positions)),
            vec![Stage::Positions]
        );
    }

    #[test]
    fn minimal_config_takes_defaults() {
        let cfg = SyncConfig::from_json(&serde_json::json!({ "account": "U1" })).unwrap();
        assert_eq!(cfg.notion.page_size, 100);
        assert_eq!(cfg.trades.sec_types, vec![SecType::Stock]);
        assert_eq!(cfg.trades.group_by, GroupBy::Order);
        assert_eq!(cfg.positions.multipliers().multiplier_for(&SecType::Option), 100);
        assert_eq!(cfg.stages.enabled(None), Stage::ALL.to_vec());
    }

    #[test]
    fn empty_account_is_rejected() {
        let err = SyncConfig::from_json(&serde_json::json!({ "account": " " })).unwrap_err();
        assert!(err.to_string().contains("/account"));
    }

    #[test]
    fn validate_names_the_missing_pointer() {
        let cfg = SyncConfig::from_json(&serde_json::json!({ "account": "U1" })).unwrap();
        let err = cfg.validate_for(&[Stage::Trades]).unwrap_err().to_string();
        assert!(err.contains("/sheets/spreadsheet_id"), "{err}");
        assert!(err.contains("stage=trades"), "{err}");
    }

    #[test]
    fn notion_page_size_above_limit_is_rejected() {
        let cfg = SyncConfig::from_json(&serde_json::json!({
            "account": "U1",
            "notion": { "positions_database": "db", "page_size": 500 }
        }))
        .unwrap();
        assert!(cfg.validate_for(&[Stage::Positions]).is_err());
    }
}
