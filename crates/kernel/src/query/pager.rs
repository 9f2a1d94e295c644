//! Pagination calculator.
//!
//! Turns page / page-size / offset request parameters into an offset and a
//! limit, and builds paging metadata for a result page. Every getter reads
//! the parameters once and memoizes the outcome for the lifetime of the
//! [`Paginator`].

use std::cell::Cell;

use serde::{Deserialize, Deserializer, Serialize};

use super::types::{NO_LIMIT, PageMeta, PageResult, RawParams};
use crate::error::{QueryError, QueryResult};

/// Pagination configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatorConfig {
    /// Page size used when the request does not carry a valid one.
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,

    /// Name of the page number parameter.
    #[serde(default = "default_page_param")]
    pub page_param: String,

    /// Name of the page size parameter.
    #[serde(default = "default_page_size_param")]
    pub page_size_param: String,

    /// Name of an explicit offset parameter. When unset, the offset is
    /// derived from the page number and page size.
    #[serde(default)]
    pub offset_param: Option<String>,

    /// Inclusive `(min, max)` clamp for the requested page size; `false`
    /// in settings files disables clamping.
    #[serde(
        default = "default_page_size_limit",
        deserialize_with = "deserialize_page_size_limit"
    )]
    pub page_size_limit: Option<(u64, u64)>,
}

fn default_page_size() -> u64 {
    30
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_page_size_param() -> String {
    "limit".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_page_size_limit() -> Option<(u64, u64)> {
    Some((1, 150))
}

impl Default for PaginatorConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            page_param: default_page_param(),
            page_size_param: default_page_size_param(),
            offset_param: None,
            page_size_limit: default_page_size_limit(),
        }
    }
}

impl PaginatorConfig {
    /// Parameter names the paginator consumes.
    pub fn control_params(&self) -> Vec<&str> {
        let mut names = vec![self.page_param.as_str(), self.page_size_param.as_str()];
        if let Some(ref offset) = self.offset_param {
            names.push(offset.as_str());
        }
        names
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PageSizeLimitSetting {
    Range([u64; 2]),
    Enabled(bool),
}

fn deserialize_page_size_limit<'de, D>(deserializer: D) -> Result<Option<(u64, u64)>, D::Error>
where
    D: Deserializer<'de>,
{
    match PageSizeLimitSetting::deserialize(deserializer)? {
        PageSizeLimitSetting::Range([min, max]) if min <= max => Ok(Some((min, max))),
        PageSizeLimitSetting::Range([min, max]) => Err(serde::de::Error::custom(format!(
            "page_size_limit minimum {min} is greater than maximum {max}"
        ))),
        PageSizeLimitSetting::Enabled(false) => Ok(None),
        PageSizeLimitSetting::Enabled(true) => Ok(default_page_size_limit()),
    }
}

/// Per-request pagination calculator.
///
/// Not `Sync`: create one per request.
#[derive(Debug)]
pub struct Paginator<'a> {
    params: &'a RawParams,
    config: &'a PaginatorConfig,
    page: Cell<Option<u64>>,
    page_size: Cell<Option<u64>>,
    offset: Cell<Option<u64>>,
}

impl<'a> Paginator<'a> {
    pub fn new(params: &'a RawParams, config: &'a PaginatorConfig) -> Self {
        Self {
            params,
            config,
            page: Cell::new(None),
            page_size: Cell::new(None),
            offset: Cell::new(None),
        }
    }

    /// Current page number (1-indexed).
    ///
    /// Defaults to 1 when the parameter is absent; fails when it is present
    /// but not a positive integer.
    pub fn page(&self) -> QueryResult<u64> {
        if let Some(page) = self.page.get() {
            return Ok(page);
        }

        let page = match self.params.scalar(&self.config.page_param) {
            None => 1,
            Some(value) => value
                .as_i64()
                .filter(|n| *n > 0)
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| {
                    QueryError::invalid_argument(format!(
                        "invalid \"{}\" argument, should be a positive integer",
                        self.config.page_param
                    ))
                })?,
        };

        self.page.set(Some(page));
        Ok(page)
    }

    /// Items per page; 0 means unbounded.
    pub fn page_size(&self) -> u64 {
        if let Some(size) = self.page_size.get() {
            return size;
        }

        let requested = self
            .params
            .scalar(&self.config.page_size_param)
            .and_then(|v| v.as_i64())
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(self.config.default_page_size);

        let size = match self.config.page_size_limit {
            Some((min, max)) => {
                let clamped = if requested < min {
                    min
                } else if requested > max {
                    max
                } else {
                    requested
                };
                if clamped != requested {
                    tracing::debug!(requested, clamped, min, max, "page size clamped");
                }
                clamped
            }
            None => requested,
        };

        self.page_size.set(Some(size));
        size
    }

    /// Rows to skip.
    ///
    /// Reads the offset parameter when one is configured (invalid or negative
    /// values become 0); otherwise derives `(page - 1) * page_size`.
    pub fn offset(&self) -> QueryResult<u64> {
        if let Some(offset) = self.offset.get() {
            return Ok(offset);
        }

        let offset = match self.config.offset_param {
            Some(ref name) => self
                .params
                .scalar(name)
                .and_then(|v| v.as_i64())
                .and_then(|n| u64::try_from(n).ok())
                .unwrap_or(0),
            None => {
                let page = self.page()?;
                (page - 1)
                    .checked_mul(self.page_size())
                    .filter(|o| i64::try_from(*o).is_ok())
                    .ok_or_else(|| {
                        QueryError::invalid_argument(format!(
                            "offset for page {page} exceeds the safe integer range"
                        ))
                    })?
            }
        };

        self.offset.set(Some(offset));
        Ok(offset)
    }

    /// Page size as a limit, or [`NO_LIMIT`] when unbounded.
    pub fn limit(&self) -> i64 {
        match self.page_size() {
            0 => NO_LIMIT,
            size => i64::try_from(size).unwrap_or(i64::MAX),
        }
    }

    /// Number of pages needed for `total_count` items.
    pub fn page_count(&self, total_count: i64) -> u64 {
        let total = u64::try_from(total_count).unwrap_or(0);
        match self.page_size() {
            0 => u64::from(total > 0),
            size => total.div_ceil(size),
        }
    }

    /// Wrap a fetched page with its metadata.
    ///
    /// Fails when either argument is missing; zero and empty are fine.
    pub fn build_result<T>(
        &self,
        total_count: Option<i64>,
        items: Option<Vec<T>>,
    ) -> QueryResult<PageResult<T>> {
        let total_count = total_count
            .ok_or_else(|| QueryError::invalid_argument("invalid \"totalCount\" argument"))?;
        let items =
            items.ok_or_else(|| QueryError::invalid_argument("invalid \"collection\" argument"))?;

        Ok(PageResult {
            meta: PageMeta {
                total_count,
                page_count: self.page_count(total_count),
                current_page: self.page()?,
                per_page: self.page_size(),
            },
            items,
        })
    }

    /// Override the page number; `None` re-reads the parameter on next use.
    ///
    /// Page numbers start at 1; `Some(0)` is rejected and leaves state as is.
    pub fn set_page(&self, page: Option<u64>) -> QueryResult<()> {
        if page == Some(0) {
            return Err(QueryError::invalid_argument(format!(
                "invalid \"{}\" argument, should be a positive integer",
                self.config.page_param
            )));
        }
        self.page.set(page);
        self.offset.set(None);
        Ok(())
    }

    /// Override the page size; `None` re-reads the parameter on next use.
    ///
    /// Negative sizes fall back to the default. No clamping is applied.
    pub fn set_page_size(&self, size: Option<i64>) {
        let size = size.map(|s| u64::try_from(s).unwrap_or(self.config.default_page_size));
        self.page_size.set(size);
        self.offset.set(None);
    }

    /// Override the offset; `None` recomputes it on next use.
    pub fn set_offset(&self, offset: Option<u64>) {
        self.offset.set(offset);
    }
}
