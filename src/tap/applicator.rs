//! Patch applicator - runs every operation of every patch against the
//! resources it selects.
//!
//! Patches run in load order and operations in patch order; each operation
//! visits the selected resources in declaration order. A failure aborts the
//! run unless the patch has `continue_on_error`, in which case only that
//! operation is skipped for that resource.

use super::errors::PatchError;
use super::operations::apply_operation;
use super::schema::{Mode, Operation, Patch, PatchSpec};
use crate::terraform::{Module, ResourceAddress};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// What happened to one operation on one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
#[must_use = "Outcome should be checked for skipped operations"]
pub enum Outcome {
    Applied,
    /// Failed, but the patch continues on error.
    Skipped { reason: String },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Applied => write!(f, "applied"),
            Outcome::Skipped { reason } => write!(f, "skipped: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    /// The selector, e.g. `resource "aws_instance"`.
    pub patch: String,
    pub mode: Mode,
    pub path: String,
    pub resource: ResourceAddress,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl OperationReport {
    fn new(patch: &Patch, operation: &Operation, resource: ResourceAddress, outcome: Outcome) -> Self {
        Self {
            patch: patch.to_string(),
            mode: operation.mode,
            path: operation.path.to_string(),
            resource,
            outcome,
        }
    }
}

impl fmt::Display for OperationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} on {}: {}",
            self.mode, self.path, self.resource, self.outcome
        )
    }
}

/// An operation failed on a resource whose patch does not continue on error.
#[derive(Debug, Error)]
#[error("{mode} {path} on {resource}: {source}")]
pub struct ApplyError {
    pub patch: String,
    pub mode: Mode,
    pub path: String,
    pub resource: ResourceAddress,
    #[source]
    pub source: PatchError,
    /// Reports for everything that ran before the failure.
    pub completed: Vec<OperationReport>,
}

#[instrument(skip_all, fields(patches = spec.patches.len()))]
pub fn apply_patches(
    module: &mut Module,
    spec: &PatchSpec,
) -> Result<Vec<OperationReport>, ApplyError> {
    let mut reports = Vec::new();
    for patch in &spec.patches {
        let selected: Vec<usize> = module
            .declarations
            .iter()
            .enumerate()
            .filter(|(_, decl)| {
                decl.resource_address()
                    .is_some_and(|address| patch.selects(&address))
            })
            .map(|(idx, _)| idx)
            .collect();
        if selected.is_empty() {
            debug!(patch = %patch, "no resources selected");
            continue;
        }
        debug!(patch = %patch, resources = selected.len(), "applying patch");

        for operation in &patch.operations {
            for &idx in &selected {
                let decl = &mut module.declarations[idx];
                let Some(address) = decl.resource_address() else {
                    continue;
                };
                match apply_operation(&mut decl.body, operation) {
                    Ok(()) => {
                        debug!(resource = %address, mode = %operation.mode, path = %operation.path, "applied");
                        reports.push(OperationReport::new(patch, operation, address, Outcome::Applied));
                    }
                    Err(err) if patch.continue_on_error => {
                        warn!(resource = %address, mode = %operation.mode, path = %operation.path, error = %err, "skipping failed operation");
                        reports.push(OperationReport::new(
                            patch,
                            operation,
                            address,
                            Outcome::Skipped {
                                reason: err.to_string(),
                            },
                        ));
                    }
                    Err(source) => {
                        return Err(ApplyError {
                            patch: patch.to_string(),
                            mode: operation.mode,
                            path: operation.path.to_string(),
                            resource: address,
                            source,
                            completed: reports,
                        });
                    }
                }
            }
        }
    }
    Ok(reports)
}
