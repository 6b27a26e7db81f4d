use flowlens_types::{config::EstimationConfig, timing::StageTiming, Architecture};

fn share(value: u64, ratio: f64) -> u64 {
    (value as f64 * ratio).round() as u64
}

/// Splits a client-measured total into per-stage guesses using fixed ratios.
///
/// The result is only fit for a diagram marked as estimated; it must never
/// be stored alongside measured stage timings.
pub fn estimate_stage_timing(
    architecture: Architecture,
    total: u64,
    ratios: &EstimationConfig,
) -> StageTiming {
    match architecture {
        Architecture::SyncFederated => {
            let network = share(total, ratios.network_share);
            let router = share(total, ratios.router_share);
            let subgraphs = total.saturating_sub(network + router);
            let hr = share(subgraphs, ratios.hr_share);
            let employment = share(subgraphs, ratios.employment_share);
            let security = share(subgraphs, ratios.security_share);
            StageTiming {
                total: Some(total),
                network: Some(network),
                router: Some(router),
                hr: Some(hr),
                hr_db: Some(share(hr, ratios.db_share)),
                employment: Some(employment),
                employment_db: Some(share(employment, ratios.db_share)),
                security: Some(security),
                security_db: Some(share(security, ratios.db_share)),
                ..Default::default()
            }
        }
        Architecture::AsyncProjected => {
            let query_service = share(total, ratios.query_service_share);
            StageTiming {
                total: Some(total),
                query_service: Some(query_service),
                db: Some(share(query_service, ratios.db_share)),
                ..Default::default()
            }
        }
    }
}
