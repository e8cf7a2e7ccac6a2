use crate::cli::ServeArgs;
use crate::infra::{
    load_export, read_export, AppState, InMemoryAuditSink, InMemoryPipelineRepository,
};
use crate::routes::with_pipeline_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use hr_pipeline::config::{AppConfig, MaintenanceConfig};
use hr_pipeline::error::AppError;
use hr_pipeline::telemetry;
use hr_pipeline::workflows::request::{request_pipeline, RequestService};
use hr_pipeline::workflows::response::{response_pipeline, ResponseService};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

type Requests = RequestService<InMemoryPipelineRepository, InMemoryAuditSink>;
type Responses = ResponseService<InMemoryPipelineRepository, InMemoryAuditSink>;

pub(crate) struct PipelineServices {
    pub(crate) requests: Arc<Requests>,
    pub(crate) responses: Arc<Responses>,
}

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let services = build_services(&config.maintenance, Arc::new(InMemoryAuditSink::default()))?;

    let app = with_pipeline_routes(services.requests, services.responses)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "hr pipeline service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Creates both stores, loads the configured seed exports into them and runs the
/// startup backfill over the loaded records when it is enabled.
pub(crate) fn build_services(
    maintenance: &MaintenanceConfig,
    audit: Arc<InMemoryAuditSink>,
) -> Result<PipelineServices, AppError> {
    let request_store = seeded_store(maintenance.request_seed.as_deref())?;
    let response_store = seeded_store(maintenance.response_seed.as_deref())?;

    let requests = Arc::new(RequestService::new(
        Arc::new(request_pipeline()?),
        request_store,
        audit.clone(),
    ));
    let responses = Arc::new(ResponseService::new(
        Arc::new(response_pipeline()?),
        response_store,
        audit,
    ));

    if maintenance.backfill_on_start {
        let request_report = requests.backfill()?;
        let response_report = responses.backfill()?;
        info!(
            requests_scanned = request_report.scanned,
            requests_updated = request_report.updated,
            responses_scanned = response_report.scanned,
            responses_updated = response_report.updated,
            "startup backfill complete"
        );
    }

    Ok(PipelineServices {
        requests,
        responses,
    })
}

fn seeded_store(seed: Option<&Path>) -> Result<Arc<InMemoryPipelineRepository>, AppError> {
    let store = InMemoryPipelineRepository::default();
    if let Some(path) = seed {
        let ids = load_export(&store, &read_export(path)?)?;
        info!(path = %path.display(), records = ids.len(), "seed export loaded");
    }
    Ok(Arc::new(store))
}
