//! Anchorage - integrity audit sweep
//!
//! Walks every asset record, verifies each fingerprint against its blockchain
//! anchor, and (optionally) recovers divergent records. Runs once or on an
//! interval.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anchorage::{
    adapters::http::{HttpAnchorClient, HttpContentStore},
    config::Args,
    db::{MongoAssetStore, MongoClient, MongoLedgerStore},
    workflow::VerificationReport,
    AnchorageError, AssetWorkflow,
};

#[derive(Debug, Default)]
struct SweepReport {
    total: usize,
    verified: usize,
    skipped: usize,
    recovered: usize,
    recovery_failed: usize,
    suppressed: usize,
    errors: usize,
}

async fn sweep(workflow: &AssetWorkflow, args: &Args) -> anyhow::Result<SweepReport> {
    let asset_ids = workflow.list_asset_ids().await?;
    let mut report = SweepReport {
        total: asset_ids.len(),
        ..Default::default()
    };

    for asset_id in &asset_ids {
        let outcome = match workflow
            .retrieve(asset_id, args.auto_recover, Some(&args.sweep_actor))
            .await
        {
            Ok(outcome) => outcome,
            Err(AnchorageError::NotFound(_)) => {
                // Soft-deleted since listing; nothing to audit
                continue;
            }
            Err(e) => {
                error!(asset_id, error = %e, "audit failed for asset");
                report.errors += 1;
                continue;
            }
        };

        match &outcome.verification {
            VerificationReport::Skipped { reason } => {
                warn!(asset_id, reason, "verification skipped");
                report.skipped += 1;
            }
            VerificationReport::Checked(result) if result.verified && !result.tx_id_mismatch => {
                report.verified += 1;
            }
            VerificationReport::Checked(_) => match &outcome.recovery {
                Some(r) if r.recovery_successful => {
                    info!(asset_id, restored = r.restored_fields.len(), "asset recovered");
                    report.recovered += 1;
                }
                Some(r) => {
                    warn!(asset_id, reason = ?r.reason, "recovery failed");
                    report.recovery_failed += 1;
                }
                None if outcome.recovery_suppressed => {
                    warn!(asset_id, "divergent, recovery suppressed");
                    report.suppressed += 1;
                }
                None => {
                    warn!(asset_id, "divergent, auto-recovery disabled");
                    report.recovery_failed += 1;
                }
            },
        }
    }

    Ok(report)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("anchorage={},info", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("======================================");
    info!("  Anchorage - integrity audit sweep");
    info!("======================================");
    info!("MongoDB: {}", args.mongodb_uri);
    info!("Anchor bridge: {}", args.anchor_url);
    info!("Content store: {}", args.content_store_url);
    info!("Auto-recover: {}", args.auto_recover);
    if args.sweep_interval_secs > 0 {
        info!("Interval: {}s", args.sweep_interval_secs);
    } else {
        info!("Mode: one-shot");
    }
    info!("======================================");

    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => client,
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let assets = Arc::new(MongoAssetStore::new(&mongo).await?);
    let ledger = Arc::new(MongoLedgerStore::new(&mongo).await?);
    let anchor = Arc::new(HttpAnchorClient::new(&args.anchor_url, args.adapter_timeout())?);
    let content = Arc::new(HttpContentStore::new(
        &args.content_store_url,
        args.adapter_timeout(),
    )?);

    let workflow = AssetWorkflow::new(assets, ledger, anchor, content, args.engine_config());

    loop {
        let report = sweep(&workflow, &args).await?;
        info!(
            total = report.total,
            verified = report.verified,
            recovered = report.recovered,
            recovery_failed = report.recovery_failed,
            suppressed = report.suppressed,
            skipped = report.skipped,
            errors = report.errors,
            "sweep complete"
        );

        if args.sweep_interval_secs == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_secs(args.sweep_interval_secs)).await;
    }

    Ok(())
}
