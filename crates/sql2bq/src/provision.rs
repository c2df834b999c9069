//! Destination dataset and table provisioning.
//!
//! Best effort: "already exists" counts as success and every other failure is
//! logged without aborting the run, so re-running against a provisioned
//! destination simply appends.

use tracing::{error, info};

use crate::connectors::{DestinationConnector, TableRef};
use crate::schema::Schema;

/// What happened to one provisioning step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// The resource was created.
    Created,
    /// The resource was already there.
    AlreadyExists,
    /// The table was deleted (reset requested).
    Deleted,
    /// The step was not requested.
    Skipped,
    /// The step failed; the run continues.
    Failed(String),
}

/// Outcome of [`DestinationProvisioner::ensure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Dataset creation.
    pub dataset: StepStatus,
    /// Optional table reset.
    pub reset: StepStatus,
    /// Table creation.
    pub table: StepStatus,
}

/// Creates the destination dataset and table.
pub struct DestinationProvisioner<'a> {
    destination: &'a dyn DestinationConnector,
    table: &'a TableRef,
}

impl<'a> DestinationProvisioner<'a> {
    /// Creates a provisioner for one table.
    #[must_use]
    pub fn new(destination: &'a dyn DestinationConnector, table: &'a TableRef) -> Self {
        Self { destination, table }
    }

    /// Ensures the dataset and table exist, deleting the table first when `reset` is set.
    ///
    /// Never fails: problems are logged and reported.
    pub async fn ensure(&self, schema: &Schema, reset: bool) -> ProvisionReport {
        let dataset = match self.destination.ensure_dataset(self.table).await {
            Ok(()) => {
                info!("Added dataset {}", self.table.dataset_id);
                StepStatus::Created
            }
            Err(e) if e.is_already_exists() => {
                info!("Dataset {} already exists", self.table.dataset_id);
                StepStatus::AlreadyExists
            }
            Err(e) => {
                error!("Error creating dataset {}: {}", self.table.dataset_id, e);
                StepStatus::Failed(e.to_string())
            }
        };

        let reset = if reset {
            info!("Trying to delete table {}", self.table);
            match self.destination.delete_table(self.table).await {
                Ok(()) => {
                    info!("Table {} deleted", self.table);
                    StepStatus::Deleted
                }
                Err(e) => {
                    info!("Table {} was not deleted: {}", self.table, e);
                    StepStatus::Failed(e.to_string())
                }
            }
        } else {
            StepStatus::Skipped
        };

        let table = match self.destination.create_table(self.table, schema).await {
            Ok(()) => {
                info!("Added table {}", self.table);
                StepStatus::Created
            }
            Err(e) if e.is_already_exists() => {
                info!("Table {} already exists", self.table);
                StepStatus::AlreadyExists
            }
            Err(e) => {
                error!("Error creating table {}: {}", self.table, e);
                StepStatus::Failed(e.to_string())
            }
        };

        ProvisionReport {
            dataset,
            reset,
            table,
        }
    }
}
