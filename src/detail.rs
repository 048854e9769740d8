//! Selection/detail controller: which contact is open in the detail panel.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::source::{self, ContactSource, ImageRef, RawContactDetail, SourceError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNumber {
    pub number: String,
}

/// Full record shown in the detail panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactDetail {
    pub id: String,
    pub name: String,
    pub image: Option<ImageRef>,
    pub phone_numbers: Vec<PhoneNumber>,
}

impl From<RawContactDetail> for ContactDetail {
    fn from(raw: RawContactDetail) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            image: raw.image,
            phone_numbers: raw
                .phone_numbers
                .into_iter()
                .map(|number| PhoneNumber { number })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disclosure {
    #[default]
    Closed,
    Open,
}

#[derive(Debug, Error)]
pub enum DetailError {
    #[error("contact not found: {0}")]
    NotFound(String),
    #[error("contact details could not be loaded: {0}")]
    SourceUnavailable(SourceError),
    #[error("selection of {0} was superseded")]
    Superseded(String),
}

impl From<SourceError> for DetailError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound(id) => DetailError::NotFound(id),
            other => DetailError::SourceUnavailable(other),
        }
    }
}

/// Fetch a fresh detail record. Never served from a cache.
pub async fn fetch<S: ContactSource>(
    source: &S,
    id: &str,
    limit: Duration,
) -> Result<ContactDetail, DetailError> {
    let raw = source::with_timeout(limit, source.contact_by_id(id)).await?;
    Ok(raw.into())
}

/// Identifies one selection request; only the latest one may be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectTicket {
    generation: u64,
}

#[derive(Debug)]
pub enum SelectOutcome {
    Applied,
    /// A newer selection (or a close) was issued after this one.
    Superseded,
    Failed(DetailError),
}

#[derive(Debug, Default)]
pub struct DetailController {
    detail: Option<ContactDetail>,
    disclosure: Disclosure,
    issued: u64,
    pending: Option<String>,
}

impl DetailController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a selection. The caller fetches the detail and hands the result
    /// back through `finish_select` with the returned ticket.
    pub fn begin_select(&mut self, id: &str) -> SelectTicket {
        self.issued += 1;
        self.pending = Some(id.to_string());
        SelectTicket {
            generation: self.issued,
        }
    }

    pub fn finish_select(
        &mut self,
        ticket: SelectTicket,
        result: Result<ContactDetail, DetailError>,
    ) -> SelectOutcome {
        if ticket.generation != self.issued {
            debug!(
                generation = ticket.generation,
                latest = self.issued,
                "discarding superseded detail result"
            );
            return SelectOutcome::Superseded;
        }
        self.pending = None;
        match result {
            Ok(detail) => {
                self.detail = Some(detail);
                self.disclosure = Disclosure::Open;
                SelectOutcome::Applied
            }
            Err(err) => SelectOutcome::Failed(err),
        }
    }

    /// Select and fetch in one step.
    pub async fn select<S: ContactSource>(
        &mut self,
        source: &S,
        id: &str,
        limit: Duration,
    ) -> Result<&ContactDetail, DetailError> {
        let ticket = self.begin_select(id);
        let result = fetch(source, id, limit).await;
        let outcome = self.finish_select(ticket, result);
        self.selected_detail(outcome, id)
    }

    fn selected_detail(
        &self,
        outcome: SelectOutcome,
        id: &str,
    ) -> Result<&ContactDetail, DetailError> {
        match outcome {
            SelectOutcome::Applied => self
                .detail
                .as_ref()
                .ok_or_else(|| DetailError::NotFound(id.to_string())),
            SelectOutcome::Superseded => Err(DetailError::Superseded(id.to_string())),
            SelectOutcome::Failed(err) => Err(err),
        }
    }

    /// Close the panel. The held detail is kept; in-flight selections are
    /// dropped so the panel cannot reopen on its own.
    pub fn close(&mut self) {
        self.disclosure = Disclosure::Closed;
        if self.pending.take().is_some() {
            self.issued += 1;
        }
    }

    pub fn detail(&self) -> Option<&ContactDetail> {
        self.detail.as_ref()
    }

    pub fn disclosure(&self) -> Disclosure {
        self.disclosure
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_panel_visible(&self) -> bool {
        self.disclosure == Disclosure::Open && self.detail.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testing::{contact, ScriptedSource};

    const LIMIT: Duration = Duration::from_secs(5);

    fn source() -> ScriptedSource {
        let source = ScriptedSource::new(vec![contact("1", "Ana"), contact("2", "Bruno")]);
        source.set_phones("1", &["+5511912345678", "+14155550100"]);
        source
    }

    #[test]
    fn test_initial_state_is_closed_and_empty() {
        let controller = DetailController::new();
        assert_eq!(controller.disclosure(), Disclosure::Closed);
        assert!(controller.detail().is_none());
        assert!(!controller.is_panel_visible());
    }

    #[test]
    fn test_close_before_any_select_leaves_panel_hidden() {
        let mut controller = DetailController::new();
        controller.close();
        assert_eq!(controller.disclosure(), Disclosure::Closed);
        assert!(!controller.is_panel_visible());
    }

    #[tokio::test]
    async fn test_select_opens_with_detail() {
        let source = source();
        let mut controller = DetailController::new();
        let detail = controller.select(&source, "1", LIMIT).await.unwrap();
        assert_eq!(detail.name, "Ana");
        assert_eq!(
            detail.phone_numbers,
            vec![
                PhoneNumber { number: "+5511912345678".into() },
                PhoneNumber { number: "+14155550100".into() },
            ]
        );
        assert_eq!(controller.disclosure(), Disclosure::Open);
        assert!(controller.is_panel_visible());
    }

    #[tokio::test]
    async fn test_close_keeps_detail() {
        let source = source();
        let mut controller = DetailController::new();
        controller.select(&source, "1", LIMIT).await.unwrap();
        controller.close();
        assert_eq!(controller.disclosure(), Disclosure::Closed);
        assert_eq!(controller.detail().map(|d| d.id.as_str()), Some("1"));
        assert!(!controller.is_panel_visible());
    }

    #[tokio::test]
    async fn test_reselect_after_close_refetches() {
        let source = source();
        let mut controller = DetailController::new();
        controller.select(&source, "1", LIMIT).await.unwrap();
        controller.close();
        controller.select(&source, "1", LIMIT).await.unwrap();
        assert_eq!(*source.detail_calls.borrow(), vec!["1", "1"]);
        assert_eq!(controller.disclosure(), Disclosure::Open);
    }

    #[tokio::test]
    async fn test_not_found_leaves_state_unchanged() {
        let source = source();
        let mut controller = DetailController::new();
        controller.select(&source, "2", LIMIT).await.unwrap();
        controller.close();

        let err = controller.select(&source, "gone", LIMIT).await.unwrap_err();
        assert!(matches!(err, DetailError::NotFound(id) if id == "gone"));
        assert_eq!(controller.disclosure(), Disclosure::Closed);
        assert_eq!(controller.detail().map(|d| d.id.as_str()), Some("2"));
    }

    #[tokio::test]
    async fn test_failure_while_open_stays_open() {
        let source = source();
        let mut controller = DetailController::new();
        controller.select(&source, "1", LIMIT).await.unwrap();
        source.set_failing(true);

        let err = controller.select(&source, "2", LIMIT).await.unwrap_err();
        assert!(matches!(err, DetailError::SourceUnavailable(_)));
        assert_eq!(controller.disclosure(), Disclosure::Open);
        assert_eq!(controller.detail().map(|d| d.id.as_str()), Some("1"));
    }

    #[tokio::test]
    async fn test_older_selection_resolving_last_is_discarded() {
        let source = source();
        let mut controller = DetailController::new();

        let first = controller.begin_select("1");
        let second = controller.begin_select("2");

        let gate = source.gate("1");
        let (slow, fast) = tokio::join!(fetch(&source, "1", LIMIT), async {
            let result = fetch(&source, "2", LIMIT).await;
            let _ = gate.send(());
            result
        });

        assert!(matches!(
            controller.finish_select(second, fast),
            SelectOutcome::Applied
        ));
        assert!(matches!(
            controller.finish_select(first, slow),
            SelectOutcome::Superseded
        ));
        assert_eq!(controller.detail().map(|d| d.id.as_str()), Some("2"));
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn test_close_drops_in_flight_selection() {
        let source = source();
        let mut controller = DetailController::new();
        let ticket = controller.begin_select("1");
        controller.close();
        let result = fetch(&source, "1", LIMIT).await;
        assert!(matches!(
            controller.finish_select(ticket, result),
            SelectOutcome::Superseded
        ));
        assert!(!controller.is_panel_visible());
    }

    #[tokio::test]
    async fn test_select_carries_image() {
        let source = source();
        source.set_image("2", "data:image/png;base64,AAAA");
        let mut controller = DetailController::new();
        let detail = controller.select(&source, "2", LIMIT).await.unwrap();
        assert_eq!(
            detail.image.as_ref().map(|image| image.as_str()),
            Some("data:image/png;base64,AAAA")
        );
    }

    #[tokio::test]
    async fn test_superseded_selection_is_not_reported_as_held_detail() {
        let source = source();
        let mut controller = DetailController::new();
        controller.select(&source, "1", LIMIT).await.unwrap();

        let err = controller
            .selected_detail(SelectOutcome::Superseded, "2")
            .unwrap_err();
        assert!(matches!(err, DetailError::Superseded(id) if id == "2"));
        assert_eq!(controller.detail().map(|d| d.id.as_str()), Some("1"));
    }
}
