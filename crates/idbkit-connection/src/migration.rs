//! Migration ordering
//!
//! Given the version stored before an open, run every callback registered
//! for a newer version: ascending by version, then in registration order.
//! A panicking callback is reported as a failure of that callback.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use idbkit_host::UpgradeTransaction;
use idbkit_schema::{DatabaseConfig, SchemaVersion};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("upgrade callback #{index} for version {version} failed: {source}")]
pub struct MigrationError {
    pub version: SchemaVersion,
    /// Position of the callback within its version, starting at 0
    pub index: usize,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied_versions: Vec<SchemaVersion>,
    pub callbacks_run: usize,
}

pub fn run_migrations(
    config: &DatabaseConfig,
    tx: &mut dyn UpgradeTransaction,
) -> Result<MigrationReport, MigrationError> {
    let event = tx.event().clone();
    let mut report = MigrationReport::default();

    for step in config.steps_after(event.old_version) {
        tracing::debug!(
            database = %event.database,
            version = step.version.get(),
            callbacks = step.callbacks.len(),
            "Applying upgrade"
        );

        for (index, callback) in step.callbacks.iter().enumerate() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&event, &mut *tx)))
                .unwrap_or_else(|payload| {
                    Err(anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref())))
                });

            outcome.map_err(|source| MigrationError {
                version: step.version,
                index,
                source,
            })?;
            report.callbacks_run += 1;
        }
        report.applied_versions.push(step.version);
    }

    Ok(report)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
