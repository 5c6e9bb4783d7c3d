//! Error and warning types shared by every pipeline stage

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal conditions. Any of these aborts the run before output is written.
#[derive(Error, Debug)]
pub enum Error {
    /// `n_customers` is `None` when the count is rejected before any data is loaded.
    #[error("cannot create {requested} clusters: {}", cluster_bound(.n_customers))]
    InvalidClusterCount {
        requested: usize,
        n_customers: Option<usize>,
    },

    #[error("insufficient data: need at least {required} customers, found {found}")]
    InsufficientData { required: usize, found: usize },

    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("nearest neighbour index error: {0}")]
    NearestNeighbour(String),

    #[error("failed to parse {column} value '{value}'")]
    Parse { column: String, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data frame error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("plotting error: {0}")]
    Plot(String),
}

fn cluster_bound(n_customers: &Option<usize>) -> String {
    match n_customers {
        Some(n) => format!("need 1 < k < {n} for {n} customers"),
        None => "need at least 2 clusters".to_string(),
    }
}

/// Table a dangling reference pointed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinTable {
    Customers,
    Products,
}

/// Recoverable conditions, accumulated and reported with the run output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Rows dropped because a reference did not resolve.
    MissingJoinKey { table: JoinTable, dropped: usize },
    /// A numeric feature had zero variance; it was centred but not scaled.
    DegenerateFeature { feature: String },
    /// A cluster lost all members and was re-seeded.
    EmptyCluster { cluster: usize, iteration: usize },
    /// A configured query customer has no profile.
    UnknownQueryCustomer { customer_id: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MissingJoinKey { table, dropped } => {
                write!(f, "dropped {dropped} rows with no matching key in {table:?}")
            }
            Warning::DegenerateFeature { feature } => {
                write!(f, "feature '{feature}' has zero variance, left unscaled")
            }
            Warning::EmptyCluster { cluster, iteration } => {
                write!(f, "cluster {cluster} emptied at iteration {iteration}, re-seeded")
            }
            Warning::UnknownQueryCustomer { customer_id } => {
                write!(f, "query customer {customer_id} has no transactions, skipped")
            }
        }
    }
}

impl Warning {
    /// Log the warning and hand it back, so call sites can push in one step.
    pub(crate) fn emit(self) -> Self {
        tracing::warn!("{}", self);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_display() {
        let warning = Warning::MissingJoinKey {
            table: JoinTable::Products,
            dropped: 2,
        };
        assert_eq!(
            warning.to_string(),
            "dropped 2 rows with no matching key in Products"
        );
    }

    #[test]
    fn test_cluster_count_display() {
        let err = Error::InvalidClusterCount {
            requested: 5,
            n_customers: Some(5),
        };
        assert_eq!(err.to_string(), "cannot create 5 clusters: need 1 < k < 5 for 5 customers");

        let err = Error::InvalidClusterCount {
            requested: 1,
            n_customers: None,
        };
        assert_eq!(err.to_string(), "cannot create 1 clusters: need at least 2 clusters");
    }

    #[test]
    fn test_warning_serializes_with_kind_tag() {
        let warning = Warning::DegenerateFeature {
            feature: "Quantity".to_string(),
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "degenerate_feature");
        assert_eq!(json["feature"], "Quantity");
    }
}
