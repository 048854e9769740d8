//! Screen state for the contact list: the search term, the grouped list,
//! the list cursor, the detail controller and the pending notice.
//!
//! Every mutation is a named transition. Async work is started by the owner
//! (the UI runtime or a test) with the tickets returned here, and its result
//! is handed back through the matching `finish_*` method, which drops results
//! that a newer request has superseded.

use tracing::{debug, warn};

use crate::detail::{ContactDetail, DetailController, DetailError, SelectOutcome, SelectTicket};
use crate::directory::{ContactSummary, DirectoryError, SectionGroup};

/// Identifies one directory load. Only the latest load, for the term that is
/// still current, may be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    term: String,
}

impl LoadTicket {
    pub fn term(&self) -> &str {
        &self.term
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    PermissionDenied,
    LoadFailed,
    DetailFailed,
    NotFound,
}

/// A dismissible message shown over the screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
}

impl Notice {
    fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: "CONTACTS".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    Superseded,
    Failed,
}

/// One rendered line of the grouped list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListRow<'a> {
    Header(char),
    Contact(&'a ContactSummary),
}

#[derive(Debug, Default)]
pub struct Screen {
    search_term: String,
    groups: Vec<SectionGroup>,
    cursor: usize,
    issued_loads: u64,
    loading: bool,
    detail: DetailController,
    notice: Option<Notice>,
}

impl Screen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn groups(&self) -> &[SectionGroup] {
        &self.groups
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn detail(&self) -> &DetailController {
        &self.detail
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// Reload for the current term (initial load, manual refresh).
    pub fn begin_load(&mut self) -> LoadTicket {
        self.issued_loads += 1;
        self.loading = true;
        LoadTicket {
            generation: self.issued_loads,
            term: self.search_term.clone(),
        }
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) -> LoadTicket {
        self.search_term = term.into();
        self.begin_load()
    }

    /// `None` when the term is already empty.
    pub fn clear_search(&mut self) -> Option<LoadTicket> {
        if self.search_term.is_empty() {
            None
        } else {
            Some(self.set_search_term(String::new()))
        }
    }

    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<Vec<SectionGroup>, DirectoryError>,
    ) -> LoadOutcome {
        if ticket.generation != self.issued_loads || ticket.term != self.search_term {
            debug!(
                term = %ticket.term,
                current = %self.search_term,
                "discarding superseded load result"
            );
            return LoadOutcome::Superseded;
        }
        self.loading = false;

        match result {
            Ok(groups) => {
                let previous = self.cursor_contact().map(|c| c.id.clone());
                self.groups = groups;
                self.cursor = previous
                    .and_then(|id| self.contacts().position(|c| c.id == id))
                    .unwrap_or(0);
                LoadOutcome::Applied
            }
            Err(DirectoryError::PermissionDenied) => {
                self.groups.clear();
                self.cursor = 0;
                self.notice = Some(Notice::new(
                    NoticeKind::PermissionDenied,
                    "Contact access was denied.",
                ));
                LoadOutcome::Failed
            }
            Err(err) => {
                warn!(error = %err, "contact load failed");
                self.notice = Some(Notice::new(
                    NoticeKind::LoadFailed,
                    "Contacts could not be loaded.",
                ));
                LoadOutcome::Failed
            }
        }
    }

    fn contacts(&self) -> impl Iterator<Item = &ContactSummary> {
        self.groups.iter().flat_map(|group| group.items.iter())
    }

    pub fn contact_count(&self) -> usize {
        self.groups.iter().map(|group| group.items.len()).sum()
    }

    pub fn cursor_contact(&self) -> Option<&ContactSummary> {
        self.contacts().nth(self.cursor)
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let count = self.contact_count();
        if count == 0 {
            self.cursor = 0;
            return;
        }
        let target = self.cursor as isize + delta;
        self.cursor = target.clamp(0, count as isize - 1) as usize;
    }

    /// Section headers interleaved with contacts, in display order.
    pub fn rows(&self) -> Vec<ListRow<'_>> {
        let mut rows = Vec::with_capacity(self.groups.len() + self.contact_count());
        for group in &self.groups {
            rows.push(ListRow::Header(group.title));
            rows.extend(group.items.iter().map(ListRow::Contact));
        }
        rows
    }

    /// Index into `rows()` of the contact under the cursor.
    pub fn cursor_row(&self) -> Option<usize> {
        let mut remaining = self.cursor;
        let mut row = 0;
        for group in &self.groups {
            row += 1;
            if remaining < group.items.len() {
                return Some(row + remaining);
            }
            remaining -= group.items.len();
            row += group.items.len();
        }
        None
    }

    /// Select the contact under the cursor.
    pub fn select_at_cursor(&mut self) -> Option<(SelectTicket, String)> {
        let id = self.cursor_contact()?.id.clone();
        Some((self.select(&id), id))
    }

    pub fn select(&mut self, id: &str) -> SelectTicket {
        self.detail.begin_select(id)
    }

    pub fn finish_select(
        &mut self,
        ticket: SelectTicket,
        result: Result<ContactDetail, DetailError>,
    ) -> bool {
        match self.detail.finish_select(ticket, result) {
            SelectOutcome::Applied => true,
            SelectOutcome::Superseded => false,
            SelectOutcome::Failed(DetailError::NotFound(id)) => {
                debug!(%id, "selected contact no longer exists");
                self.notice = Some(Notice::new(
                    NoticeKind::NotFound,
                    "This contact is no longer available.",
                ));
                false
            }
            SelectOutcome::Failed(err) => {
                warn!(error = %err, "contact detail failed");
                self.notice = Some(Notice::new(
                    NoticeKind::DetailFailed,
                    "Contact details could not be loaded.",
                ));
                false
            }
        }
    }

    pub fn close_detail(&mut self) {
        self.detail.close();
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }
}
