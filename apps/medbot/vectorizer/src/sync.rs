//! One-shot sync across namespaces

use domain_vectorization::{Namespace, SyncResult, VectorizationError, VectorizationService};
use tracing::{error, info};

/// Outcome of a one-shot sync. Every requested namespace is attempted.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub results: Vec<SyncResult>,
    pub errors: Vec<(Namespace, VectorizationError)>,
}

impl SyncReport {
    /// First failure, if any, as a top-level error
    pub fn into_error(self) -> Option<eyre::Report> {
        self.errors
            .into_iter()
            .next()
            .map(|(namespace, e)| eyre::Report::new(e).wrap_err(format!("Sync of {namespace} failed")))
    }
}

/// Sync `namespace`, or every namespace when `None`, collecting all outcomes
pub async fn run_sync(
    service: &VectorizationService,
    namespace: Option<Namespace>,
    force: bool,
) -> SyncReport {
    let outcomes = match namespace {
        Some(namespace) => vec![(namespace, service.sync(namespace, force).await)],
        None => service.sync_all(force).await,
    };

    let mut report = SyncReport::default();
    for (namespace, outcome) in outcomes {
        match outcome {
            Ok(result) => {
                info!(
                    %namespace,
                    succeeded = result.succeeded,
                    failed = result.failed.len(),
                    "Sync complete"
                );
                report.results.push(result);
            }
            Err(e) => {
                error!(%namespace, error = %e, "Sync failed");
                report.errors.push((namespace, e));
            }
        }
    }
    report
}
