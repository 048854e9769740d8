//! Contact source abstraction.
//!
//! This module provides:
//! - `ContactSource` trait: authorization, filtered query and by-id lookup
//! - `VdirSource`: a read-only source backed by a directory of vCard files
//! - Raw record types handed to the directory loader and detail controller

pub mod vdir;

#[cfg(test)]
pub mod testing;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

pub use vdir::VdirSource;

/// Opaque handle to a contact photo. Decoding is left to the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Outcome of asking the source for access to its contacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    Denied,
    Restricted,
}

impl Authorization {
    pub fn is_granted(self) -> bool {
        matches!(self, Authorization::Granted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    NameAscending,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContactQuery {
    /// Empty means unfiltered.
    pub name_filter: String,
    pub order: SortOrder,
}

impl ContactQuery {
    pub fn by_name(name_filter: impl Into<String>) -> Self {
        Self {
            name_filter: name_filter.into(),
            order: SortOrder::NameAscending,
        }
    }
}

/// A contact as returned by a source query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContact {
    pub id: String,
    pub name: String,
    pub image: Option<ImageRef>,
}

impl RawContact {
    pub fn image_present(&self) -> bool {
        self.image.is_some()
    }
}

/// Full record for a single contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContactDetail {
    pub id: String,
    pub name: String,
    pub image: Option<ImageRef>,
    pub phone_numbers: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("contact source unavailable: {0}")]
    Unavailable(String),
    #[error("contact not found: {0}")]
    NotFound(String),
    #[error("contact source did not answer within {0:?}")]
    Timeout(Duration),
}

/// Trait for contact source implementations.
///
/// Calls are issued from a single thread; implementations need not be `Send`.
#[allow(async_fn_in_trait)]
pub trait ContactSource {
    /// Ask for access to the contacts. Checked on every load.
    async fn request_authorization(&self) -> Authorization;

    /// All contacts whose name matches the query filter
    async fn query_contacts(&self, query: &ContactQuery) -> Result<Vec<RawContact>, SourceError>;

    /// Full detail for one contact; `SourceError::NotFound` when absent
    async fn contact_by_id(&self, id: &str) -> Result<RawContactDetail, SourceError>;
}

/// Bound a source call; an elapsed timer becomes `SourceError::Timeout`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, SourceError>
where
    F: Future<Output = Result<T, SourceError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout(limit)),
    }
}
