//! Contact directory loader: query the source for a search term and group
//! the results into alphabetical sections.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::source::{self, ContactQuery, ContactSource, ImageRef, RawContact, SourceError};

/// A contact as shown in the list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactSummary {
    pub id: String,
    pub name: String,
    pub image: Option<ImageRef>,
}

impl ContactSummary {
    /// `None` when the record has no usable name.
    fn from_raw(raw: RawContact) -> Option<Self> {
        let name = raw.name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            id: raw.id,
            name: name.to_string(),
            image: raw.image,
        })
    }
}

/// Contacts sharing the same first letter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionGroup {
    pub title: char,
    pub items: Vec<ContactSummary>,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("access to contacts was not granted")]
    PermissionDenied,
    #[error("contacts could not be loaded: {0}")]
    SourceUnavailable(#[from] SourceError),
}

/// Title of the section a name belongs to: its uppercased first character.
pub fn section_title(name: &str) -> Option<char> {
    name.chars()
        .next()
        .and_then(|first| first.to_uppercase().next())
}

/// Group summaries by title in one left-to-right pass, then order the
/// sections by title. Items keep their input order inside each section.
pub fn group_sections(summaries: impl IntoIterator<Item = ContactSummary>) -> Vec<SectionGroup> {
    let mut groups: Vec<SectionGroup> = summaries.into_iter().fold(Vec::new(), |mut acc, item| {
        let Some(title) = section_title(&item.name) else {
            return acc;
        };
        match acc.iter_mut().find(|group| group.title == title) {
            Some(group) => group.items.push(item),
            None => acc.push(SectionGroup {
                title,
                items: vec![item],
            }),
        }
        acc
    });
    groups.sort_by_key(|group| group.title);
    groups
}

/// Load and group all contacts matching `search_term`.
///
/// Authorization is requested on every call. When it is not granted no query
/// is issued and `DirectoryError::PermissionDenied` is returned.
pub async fn load<S: ContactSource>(
    source: &S,
    search_term: &str,
    limit: Duration,
) -> Result<Vec<SectionGroup>, DirectoryError> {
    let authorization = source::with_timeout(limit, async {
        Ok(source.request_authorization().await)
    })
    .await?;
    if !authorization.is_granted() {
        debug!(?authorization, "contact access not granted");
        return Err(DirectoryError::PermissionDenied);
    }

    let query = ContactQuery::by_name(search_term);
    let raw = source::with_timeout(limit, source.query_contacts(&query)).await?;
    let total = raw.len();
    let with_photo = raw.iter().filter(|record| record.image_present()).count();

    let summaries: Vec<ContactSummary> = raw
        .into_iter()
        .filter_map(|record| {
            let id = record.id.clone();
            let summary = ContactSummary::from_raw(record);
            if summary.is_none() {
                warn!(%id, "skipping contact without a name");
            }
            summary
        })
        .collect();

    let groups = group_sections(summaries);
    debug!(
        term = search_term,
        total,
        with_photo,
        sections = groups.len(),
        "contacts loaded"
    );
    Ok(groups)
}
