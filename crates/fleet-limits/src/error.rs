//! Resource limit errors.

use thiserror::Error;

use fleet_core::ClusterType;

/// A requested shape is below a zone minimum.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LimitError {
    #[error(
        "{cluster_type} cluster '{cluster_id}': {subject} {resource} size is \
         {requested:.2}{unit} but must be at least {minimum:.2}{unit}"
    )]
    BelowMinimum {
        cluster_type: ClusterType,
        cluster_id: String,
        /// What was requested, e.g. "node" or "group".
        subject: String,
        resource: &'static str,
        /// Either empty or " Gb".
        unit: &'static str,
        requested: f64,
        minimum: f64,
    },
}
