use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use parcel_core::app::{ActivityOutcome, ActivityWorker, ServiceBuilder, WorkerGroup, WorkerSlot};
use parcel_core::config::ResilienceConfig;
use parcel_core::domain::{Payload, UnitOfWork};
use parcel_core::impls::{ClusteredParcelStore, InMemoryClusterCache, JsonLinesAuditSink, TracingAuditSink};
use parcel_core::ports::{AuditSink, IdGenerator, SystemClock, UlidGenerator};

/// Run a demo pipeline stage through the resilience core.
#[derive(Debug, Parser)]
#[command(name = "parcel", version)]
struct Args {
    /// Path to parcel.toml (defaults apply when absent)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of units of work to feed
    #[arg(long, default_value_t = 20)]
    units: u64,

    /// Number of worker instances
    #[arg(long, default_value_t = 3)]
    workers: usize,

    /// Fail every n-th shipment (0 = never)
    #[arg(long, default_value_t = 5)]
    fail_every: u64,

    /// Cancel every n-th shipment (0 = never)
    #[arg(long, default_value_t = 0)]
    cancel_every: u64,

    /// Append audit entries to this JSON Lines file instead of the log
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Purge parcels once finalised
    #[arg(long)]
    purge: bool,

    /// Consecutive sink failures tolerated while flushing audit entries on exit
    #[arg(long, default_value_t = 5)]
    flush_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Shipment {
    sequence: u64,
    destination: String,
}

impl Payload for Shipment {
    const TYPE: &'static str = "demo.shipment.v1";
}

struct Sorter {
    fail_every: u64,
    cancel_every: u64,
    handled: AtomicU64,
}

#[async_trait]
impl ActivityWorker for Sorter {
    fn function(&self) -> &str {
        "sort"
    }

    async fn submit_activity(&self, unit_of_work: &UnitOfWork) -> ActivityOutcome {
        self.handled.fetch_add(1, Ordering::Relaxed);
        let shipment: Shipment = match unit_of_work.decode() {
            Ok(s) => s,
            Err(e) => return ActivityOutcome::Failed(e.to_string()),
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        let n = shipment.sequence + 1;
        if self.cancel_every > 0 && n % self.cancel_every == 0 {
            return ActivityOutcome::Cancelled(format!("shipment {} recalled", shipment.sequence));
        }
        if self.fail_every > 0 && n % self.fail_every == 0 {
            return ActivityOutcome::Failed(format!("no route to {}", shipment.destination));
        }
        ActivityOutcome::Finished
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();

    // (A) 設定を読む（ファイル → 環境変数）
    let config = ResilienceConfig::load(args.config.as_deref()).context("loading configuration")?;
    info!(modes = %config.node_modes(), member = %config.node.member_name, "configuration loaded");

    // (B) シンクとストアを選んでサービスを組み立てる
    let sink: Arc<dyn AuditSink> = match &args.audit_log {
        Some(path) => Arc::new(JsonLinesAuditSink::new(path.clone())),
        None => Arc::new(TracingAuditSink),
    };
    let mut builder = ServiceBuilder::new(config.clone()).audit_sink(sink);
    if config.node.resilience_mode.requires_replication() {
        // デモなのでプロセス内キャッシュで代用
        let cache = Arc::new(InMemoryClusterCache::new());
        builder = builder.store(Arc::new(ClusteredParcelStore::new(
            config.node.member_name.clone(),
            cache,
        )));
    }
    let service = Arc::new(builder.build().context("building resilience service")?);

    // (C) 監査ドレインループと worker 群を起動
    let drain = Arc::new(service.audit_drain_loop()).spawn();

    let sorter = Arc::new(Sorter {
        fail_every: args.fail_every,
        cancel_every: args.cancel_every,
        handled: AtomicU64::new(0),
    });
    let slots: Vec<WorkerSlot> = (0..args.workers.max(1))
        .map(|i| WorkerSlot {
            instance: format!("sort-{i}"),
            worker: sorter.clone(),
        })
        .collect();
    for slot in &slots {
        service.subscribe(Shipment::TYPE, &slot.instance).await?;
    }
    info!(
        subscribers = service.subscribers_for(Shipment::TYPE).await.len(),
        payload_type = Shipment::TYPE,
        "workers subscribed"
    );

    let (tx, rx) = mpsc::channel(64);
    let group = WorkerGroup::spawn(Arc::clone(&service), slots, rx, args.purge);

    // (D) unit of work を投入して、流し終わったら閉じる
    let ids = UlidGenerator::new(Arc::new(SystemClock));
    for sequence in 0..args.units {
        let shipment = Shipment {
            sequence,
            destination: format!("hub-{}", sequence % 4),
        };
        let unit = UnitOfWork::from_payload(ids.unit_of_work_id(), &shipment)?;
        tx.send(unit).await.context("worker group stopped early")?;
    }
    drop(tx);
    let report = group.join().await;

    // (E) 監査キューを閉じて流し切る（シンクが死んでいても諦めて終わる）
    let flush = service.shutdown_audit(drain, args.flush_attempts.max(1)).await;

    let counts = service.counts().await?;
    let backlog = counts.audit_backlog;
    info!(handled = sorter.handled.load(Ordering::Relaxed), "demo finished");
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "workers": report,
            "parcels": counts,
            "audit_flush": flush,
            "audit_backlog": backlog,
        }))?
    );
    Ok(())
}
