use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::{report_input::ReportSubmission, reports::ReportService};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SyncRequest {
    /// Entries are decoded one at a time so a malformed report is reported
    /// against its index instead of failing the batch.
    #[serde(default)]
    #[schema(value_type = Vec<ReportSubmission>)]
    pub reports: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SyncFailure {
    /// Position of the entry in the submitted batch
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SyncResponse {
    pub synced_count: usize,
    pub report_ids: Vec<i32>,
    pub errors: Vec<SyncFailure>,
}

/// Replays reports queued while the device was offline.
///
/// Each entry is its own unit of work, so one bad report does not stop the
/// rest of the batch.
#[instrument(skip(reports, author, request), fields(user_id = author.id, batch = request.reports.len()))]
pub async fn replay(
    reports: &ReportService,
    author: &AuthUser,
    request: SyncRequest,
) -> Result<SyncResponse, ServiceError> {
    let mut response = SyncResponse::default();

    for (index, entry) in request.reports.into_iter().enumerate() {
        let submission = match serde_json::from_value::<ReportSubmission>(entry) {
            Ok(submission) => submission,
            Err(e) => {
                warn!(index, error = %e, "offline report could not be decoded");
                counter!("reports.sync.rejected", 1);
                response.errors.push(SyncFailure {
                    index,
                    error: format!("Invalid report: {e}"),
                });
                continue;
            }
        };
        match reports.create_synced(author, submission).await {
            Ok(report_id) => {
                response.report_ids.push(report_id);
                response.synced_count += 1;
            }
            Err(e) => {
                warn!(index, error = %e, "offline report rejected");
                counter!("reports.sync.rejected", 1);
                response.errors.push(SyncFailure {
                    index,
                    error: e.response_message(),
                });
            }
        }
    }

    info!(
        synced = response.synced_count,
        failed = response.errors.len(),
        "offline sync finished"
    );
    Ok(response)
}
