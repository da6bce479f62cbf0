use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::model::path::PathRecord;

/// Selects the paths that take part in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPathsOptions {
    /// Only paths modified at or after this instant; usually the start of the
    /// last successful run.
    pub from_last_modified: Option<DateTime<Utc>>,
    /// Backend filter expression, e.g. to run one partition of the tree.
    pub filter: Option<String>,
}

impl ListPathsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_last_modified(mut self, watermark: DateTime<Utc>) -> Self {
        self.from_last_modified = Some(watermark);
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Watermark and caller filter joined into one backend expression.
    pub fn filter_expression(&self) -> Option<String> {
        let watermark = self.from_last_modified.map(|ts| {
            format!(
                "lastModified ge {}",
                ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
            )
        });
        concat_with_and([watermark.as_deref(), self.filter.as_deref()])
    }

    /// Local watermark check for listers that filter in-process.
    pub fn admits(&self, path: &PathRecord) -> bool {
        self.from_last_modified
            .map_or(true, |watermark| path.last_modified() >= watermark)
    }
}

/// Join the non-empty parts with ` and `.
pub fn concat_with_and<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    let joined = parts
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" and ");
    (!joined.is_empty()).then_some(joined)
}
