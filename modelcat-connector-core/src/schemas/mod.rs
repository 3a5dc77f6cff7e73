//! Typed models of the files a dataset must ship.
//!
//! Each model is parsed in two stages: serde handles shape and types, then a
//! `validate()` pass collects every rule violation so users see all problems
//! of a file at once instead of fixing them one by one.

pub mod annotation;
pub mod datainfo;

pub use annotation::{Annotation, Category, CocoDataset, Image, License, RecordId};
pub use datainfo::{
    ClassLabel, DatasetInfo, DatasetInfos, FeatureDecl, FeatureType, Features, SequenceFeature,
    SplitInfo, TaskKind, TaskTemplate,
};

use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid structure: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl SchemaError {
    /// Individual problems, one message each.
    pub fn issues(&self) -> Vec<String> {
        match self {
            SchemaError::Parse(e) => vec![e.to_string()],
            SchemaError::Invalid(issues) => issues.clone(),
        }
    }
}

pub(crate) fn into_result<T>(value: T, issues: Vec<String>) -> Result<T, SchemaError> {
    if issues.is_empty() {
        Ok(value)
    } else {
        Err(SchemaError::Invalid(issues))
    }
}

/// Treat an explicit JSON `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
