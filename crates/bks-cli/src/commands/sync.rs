//! `bks sync`: config → secrets → adapters → one run.

use anyhow::{Context, Result};
use bks_broker_paper::PaperConnector;
use bks_config::{report_unused_keys, secrets::resolve_secrets, Stage, SyncConfig, UnusedKeyPolicy};
use bks_notion::{NotionClient, NotionStore, NotionSummaryBlock};
use bks_reconcile::{DocumentPublisher, QueryFilter, TRADE_COLUMNS, TRADE_KEY_FIELD};
use bks_runtime::{StageOutcome, StoreTarget, SyncTargets};
use bks_sheets::SheetsStore;
use tracing::warn;

pub struct SyncArgs {
    pub config_paths: Vec<String>,
    pub session: String,
    pub only: Option<Stage>,
    pub strict_config: bool,
}

pub async fn run_sync(args: SyncArgs) -> Result<()> {
    let loaded = bks_config::load_layered_yaml(args.config_paths.as_slice())?;
    let cfg = loaded.sync_config()?;
    let stages = cfg.stages.enabled(args.only);
    cfg.validate_for(&stages)?;

    let policy = if args.strict_config {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = report_unused_keys(&stages, &loaded.config_json, policy)?;
    if !report.is_clean() {
        eprintln!(
            "WARN: CONFIG_UNUSED_KEYS stages={} unused_leaf_keys={}",
            report.stages.join(","),
            report.unused_leaf_pointers.len()
        );
        for p in report.unused_leaf_pointers.iter().take(50) {
            eprintln!("  unused={}", p);
        }
    }

    let secrets = resolve_secrets(&loaded.config_json, &stages)?;
    println!("config_hash={}", loaded.config_hash);

    let adapters = Adapters::build(&cfg, &stages, secrets.notion_token, secrets.sheets_access_token)?;
    if let Some(sheets) = &adapters.sheets {
        // An unreachable sheet surfaces again as an aborted trades stage.
        if let Err(e) = sheets.ensure_header(&cfg.sheets.sheet).await {
            warn!(sheet = %cfg.sheets.sheet, error = %e, "could not check sheet header");
        }
    }

    let targets = adapters.targets(&cfg)?;
    let connector = PaperConnector::new(&args.session);
    let summary = bks_runtime::run(&connector, &targets, &cfg, &stages).await?;

    println!("run_id={}", summary.run_id);
    for stage in &summary.stages {
        match &stage.outcome {
            StageOutcome::Synced(r) => println!(
                "stage={} records={} created={} updated={} skipped={} failed={}",
                stage.stage, stage.records, r.created, r.updated, r.skipped, r.failed
            ),
            StageOutcome::Published => println!("stage={} published=true", stage.stage),
            StageOutcome::Aborted(reason) => {
                println!("stage={} aborted=true reason={}", stage.stage, reason)
            }
        }
        if let Some(r) = stage.sync_report() {
            for key in &r.failed_keys {
                println!("  failed_key={}", key);
            }
        }
    }
    println!("{summary}");
    Ok(())
}

/// Adapters for the stages that will run; the rest stay `None`.
struct Adapters {
    notion: Option<NotionStore>,
    summary: Option<NotionSummaryBlock>,
    sheets: Option<SheetsStore>,
}

impl Adapters {
    fn build(
        cfg: &SyncConfig,
        stages: &[Stage],
        notion_token: Option<String>,
        sheets_token: Option<String>,
    ) -> Result<Self> {
        let notion_client = notion_token
            .map(|token| NotionClient::new_with_base_url(token, cfg.notion.base_url.clone()));

        let mut out = Adapters {
            notion: None,
            summary: None,
            sheets: None,
        };

        if stages.contains(&Stage::Positions) {
            let client = notion_client.clone().context("notion token not resolved")?;
            out.notion = Some(NotionStore::new(client));
        }
        if stages.contains(&Stage::AccountSummary) {
            let client = notion_client.clone().context("notion token not resolved")?;
            let page = cfg
                .notion
                .account_summary_page
                .clone()
                .context("notion.account_summary_page is required")?;
            out.summary = Some(NotionSummaryBlock::new(
                client,
                page,
                cfg.notion.account_summary_heading.clone(),
            ));
        }
        if stages.contains(&Stage::Trades) {
            let token = sheets_token.context("sheets access token not resolved")?;
            let spreadsheet = cfg
                .sheets
                .spreadsheet_id
                .clone()
                .context("sheets.spreadsheet_id is required")?;
            out.sheets = Some(SheetsStore::new_with_base_url(
                token,
                cfg.sheets.base_url.clone(),
                spreadsheet,
                TRADE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            ));
        }
        Ok(out)
    }

    fn targets(&self, cfg: &SyncConfig) -> Result<SyncTargets<'_>> {
        let mut targets = SyncTargets::default();

        if let Some(store) = &self.notion {
            let database = cfg
                .notion
                .positions_database
                .clone()
                .context("notion.positions_database is required")?;
            targets.positions = Some(StoreTarget::new(
                store,
                QueryFilter {
                    collection: database,
                    key_field: cfg.notion.key_property.clone(),
                    page_size: cfg.notion.page_size,
                },
            ));
        }
        if let Some(store) = &self.sheets {
            targets.trades = Some(StoreTarget::new(
                store,
                QueryFilter {
                    collection: cfg.sheets.sheet.clone(),
                    key_field: TRADE_KEY_FIELD.to_string(),
                    page_size: cfg.sheets.page_size,
                },
            ));
        }
        if let Some(summary) = &self.summary {
            targets.account_summary = Some(summary as &dyn DocumentPublisher);
        }
        Ok(targets)
    }
}
