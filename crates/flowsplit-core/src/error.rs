//! Error taxonomy for disaggregation runs.
//!
//! Every fatal condition names the entity that caused it (catchment, nexus,
//! land-cover class or configuration field). `OutOfRangeLag` is the only
//! per-cell condition; the engine records it as a [`CellFlag`] and keeps
//! going, while the single-cell lookup surfaces it as an error.
//!
//! [`CellFlag`]: crate::engine::CellFlag
use chrono::NaiveDate;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DisaggError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DisaggError {
    /// The drainage graph is not a DAG.
    #[error("drainage network contains a cycle through catchment '{catchment}'")]
    CycleDetected { catchment: String },

    /// A catchment has more than one downstream path and the configured
    /// policy cannot resolve it.
    #[error("catchment '{catchment}' drains through diffluent nexus '{nexus}': {reason}")]
    NonDendriticUnresolved {
        catchment: String,
        nexus: String,
        reason: String,
    },

    /// A land-cover fraction references a class absent from the coefficient table.
    #[error("catchment '{catchment}': land-cover class {class} has no {level} runoff coefficient")]
    MissingCoefficient {
        catchment: String,
        class: u16,
        level: String,
    },

    /// Non-positive (or non-finite) conductivity with the conductivity term enabled.
    #[error("catchment '{catchment}': hydraulic conductivity must be > 0, got {value}")]
    InvalidConductivity { catchment: String, value: f64 },

    /// Zero or non-finite normalization denominator.
    #[error("cohort of nexus '{nexus}' has a degenerate weight denominator on {date}")]
    DegenerateCohort { nexus: String, date: NaiveDate },

    /// Lagged lookup falls outside the reference series domain.
    #[error("catchment '{catchment}' on {date}: lag of {lag_days} days exceeds the reference series ending {last}")]
    OutOfRangeLag {
        catchment: String,
        date: NaiveDate,
        lag_days: i64,
        last: NaiveDate,
    },

    /// Malformed source data (negative precipitation/discharge, NaN, gaps, ...).
    #[error("invalid input for '{entity}': {message}")]
    InvalidInput { entity: String, message: String },

    /// A record references an identifier that does not exist.
    #[error("unknown {kind} '{id}'")]
    UnknownEntity { kind: &'static str, id: String },

    /// The downstream path of a catchment never reaches its reference nexus.
    #[error("reference nexus '{nexus}' is not downstream of catchment '{catchment}'")]
    NexusNotDownstream { catchment: String, nexus: String },

    /// Inconsistent model configuration.
    #[error("invalid configuration '{field}': {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

impl DisaggError {
    /// Convenience constructor for [`DisaggError::InvalidInput`].
    pub fn invalid_input(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`DisaggError::InvalidConfig`].
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// Whether this condition invalidates the whole run.
    ///
    /// Only `OutOfRangeLag` is recoverable: the engine marks the cell
    /// undefined and carries on.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::OutOfRangeLag { .. })
    }
}
