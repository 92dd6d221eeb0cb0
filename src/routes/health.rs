use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::constants::HEALTH_CHECK_KEY_TTL_SECS;
use crate::db::{keys, Backend};
use crate::routes::envelope::{ok, Envelope};
use crate::AppState;

const HEALTH_CHECK_VALUE: &str = "health_check";

/// Outcome of a backend round-trip check
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub success: bool,
    pub timestamp: String,
    /// Step name -> "success" | "failed" | "missed"
    pub checks: BTreeMap<&'static str, &'static str>,
    /// Step name -> error text, for failed steps only
    pub errors: BTreeMap<&'static str, String>,
}

impl HealthReport {
    fn new() -> Self {
        let checks = [
            "db_connection",
            "db_set_key",
            "db_get_key",
            "db_get_key_value",
            "db_delete_key",
        ]
        .into_iter()
        .map(|step| (step, "missed"))
        .collect();

        Self {
            success: true,
            timestamp: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            checks,
            errors: BTreeMap::new(),
        }
    }

    fn record<T, E: std::fmt::Display>(
        &mut self,
        step: &'static str,
        result: Result<T, E>,
    ) -> Option<T> {
        match result {
            Ok(value) => {
                self.checks.insert(step, "success");
                Some(value)
            }
            Err(e) => {
                self.success = false;
                self.checks.insert(step, "failed");
                self.errors.insert(step, e.to_string());
                None
            }
        }
    }
}

/// Write, read back and delete a throwaway key (it expires on its own if the
/// delete never happens).
pub async fn run_health_check(db: &dyn Backend) -> HealthReport {
    let mut report = HealthReport::new();
    let key = keys::health_check(&uuid::Uuid::new_v4().to_string());

    report.record("db_connection", db.ping().await);

    report.record(
        "db_set_key",
        db.set_with_expiry(
            &key,
            HEALTH_CHECK_VALUE,
            Duration::from_secs(HEALTH_CHECK_KEY_TTL_SECS),
        )
        .await,
    );

    let value = report.record("db_get_key", db.get(&key).await).flatten();
    let matched = match value.as_deref() {
        Some(HEALTH_CHECK_VALUE) => Ok(()),
        other => Err(format!(
            "Value should be '{}' instead value is '{}'",
            HEALTH_CHECK_VALUE,
            other.unwrap_or_default()
        )),
    };
    report.record("db_get_key_value", matched);

    report.record("db_delete_key", db.delete(&key).await);

    if !report.success {
        tracing::error!("Health check failed: {:?}", report.errors);
    }

    report
}

/// Health check endpoint
///
/// Used by load balancers and monitoring systems. Returns 500 when any step
/// against the backend fails.
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<Envelope<HealthReport>>) {
    let report = run_health_check(state.db.as_ref()).await;

    if report.success {
        return (StatusCode::OK, ok(report));
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(Envelope {
            success: "false",
            message: "Health check failed.".to_string(),
            data: report,
        }),
    )
}

/// Crate version
pub async fn version() -> Json<Envelope<Value>> {
    ok(json!({ "version": env!("CARGO_PKG_VERSION") }))
}
