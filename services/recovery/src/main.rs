use std::time::Duration;

use sea_orm::Database;
use tracing::info;

use busbar_core::tracing::init_tracing;
use busbar_recovery::config::RecoveryConfig;
use busbar_recovery::domain::types::ClusterTopology;
use busbar_recovery::infra::bus::{GatewayBusClient, GatewayReportSource};
use busbar_recovery::infra::db::{
    DbAuditSink, DbCausingEventRepository, DbFailureGroupRepository, DbFailureRecordRepository,
    DbScheduledRetryRepository,
};
use busbar_recovery::infra::inspect::PayloadInspectorRegistry;
use busbar_recovery::infra::task::{DefaultTaskFactory, GatewayTaskClient};
use busbar_recovery::listener::ReportListener;
use busbar_recovery::router::build_router;
use busbar_recovery::scheduler::{run_retry_poller, run_task_synchronizer};
use busbar_recovery::state::AppState;
use busbar_recovery::usecase::failure::FailureLifecycle;
use busbar_recovery::usecase::group::GroupDeduplicator;
use busbar_recovery::usecase::ingest::IngestFailureUseCase;
use busbar_recovery::usecase::replay::EventReplayer;
use busbar_recovery::usecase::retry::{ExponentialBackoffPolicy, RunDueRetriesUseCase};
use busbar_recovery::usecase::sync::SynchronizeTasksUseCase;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = RecoveryConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let topology = ClusterTopology::new(config.clusters.clone(), config.default_cluster.clone());
    let inspectors = PayloadInspectorRegistry::open(&topology);

    let records = DbFailureRecordRepository { db: db.clone() };
    let events = DbCausingEventRepository { db: db.clone() };
    let retries = DbScheduledRetryRepository { db: db.clone() };
    let groups = DbFailureGroupRepository { db: db.clone() };
    let audit = DbAuditSink { db: db.clone() };

    let http = reqwest::Client::new();
    let bus = GatewayBusClient::new(http.clone(), &config.bus_gateway_url);
    let tasks = GatewayTaskClient::new(http.clone(), &config.task_system_url);

    let lifecycle = FailureLifecycle {
        records: records.clone(),
        events: events.clone(),
        retries: retries.clone(),
        groups: GroupDeduplicator {
            groups,
            enabled: config.grouping_enabled,
        },
        tasks,
        task_factory: DefaultTaskFactory {
            service_name: config.service_name.clone(),
        },
        policy: ExponentialBackoffPolicy {
            initial_delay: Duration::from_secs(config.backoff_initial_delay_secs),
            multiplier: config.backoff_multiplier,
            max_delay: Duration::from_secs(config.backoff_max_delay_secs),
            max_attempts: config.backoff_max_attempts,
        },
        audit,
        replayer: EventReplayer {
            bus: bus.clone(),
            topology,
            service_name: config.service_name.clone(),
            ack_timeout: Duration::from_secs(config.replay_ack_timeout_secs),
        },
    };

    // Report listener
    let listener = ReportListener {
        source: GatewayReportSource::new(
            http.clone(),
            &config.bus_gateway_url,
            &config.report_topic,
            &config.consumer_group,
        ),
        handler: IngestFailureUseCase {
            records: records.clone(),
            events: events.clone(),
            probe: inspectors.clone(),
            lifecycle: lifecycle.clone(),
        },
        dead_letters: bus.clone(),
        dead_letter_topic: config.dead_letter_topic.clone(),
        dead_letter_cluster: config.report_cluster.clone(),
        retry_interval: Duration::from_secs(config.listener_retry_interval_secs),
    };
    tokio::spawn(listener.run());

    // Retry poller
    tokio::spawn(run_retry_poller(
        RunDueRetriesUseCase {
            retries,
            executor: lifecycle.clone(),
            batch_size: config.retry_batch_size,
            max_batches: config.retry_max_batches,
        },
        Duration::from_secs(config.retry_poll_interval_secs),
    ));

    // Task synchronizer
    tokio::spawn(run_task_synchronizer(
        SynchronizeTasksUseCase {
            records,
            driver: lifecycle,
            chunk_size: config.sync_chunk_size,
            max_chunks: config.sync_max_chunks,
        },
        Duration::from_secs(config.sync_interval_secs),
    ));

    // HTTP server
    let state = AppState {
        db,
        inspectors: inspectors.clone(),
    };
    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let tcp = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    info!("recovery service listening on {addr}");
    axum::serve(tcp, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.expect("ctrl-c handler");
        })
        .await
        .expect("server error");

    inspectors.close();
}
