//! In-memory source for unit tests. Calls can be held back with gates so
//! tests control the order in which responses resolve.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::search;

use super::{
    Authorization, ContactQuery, ContactSource, ImageRef, RawContact, RawContactDetail,
    SourceError,
};

pub fn contact(id: &str, name: &str) -> RawContact {
    RawContact {
        id: id.to_string(),
        name: name.to_string(),
        image: None,
    }
}

pub struct ScriptedSource {
    authorization: Cell<Authorization>,
    contacts: RefCell<Vec<RawContact>>,
    phones: RefCell<HashMap<String, Vec<String>>>,
    failing: Cell<bool>,
    gates: RefCell<HashMap<String, oneshot::Receiver<()>>>,
    pub authorization_calls: Cell<usize>,
    pub query_calls: RefCell<Vec<String>>,
    pub detail_calls: RefCell<Vec<String>>,
}

impl ScriptedSource {
    pub fn new(contacts: Vec<RawContact>) -> Self {
        Self {
            authorization: Cell::new(Authorization::Granted),
            contacts: RefCell::new(contacts),
            phones: RefCell::new(HashMap::new()),
            failing: Cell::new(false),
            gates: RefCell::new(HashMap::new()),
            authorization_calls: Cell::new(0),
            query_calls: RefCell::new(Vec::new()),
            detail_calls: RefCell::new(Vec::new()),
        }
    }

    pub fn set_authorization(&self, authorization: Authorization) {
        self.authorization.set(authorization);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    pub fn set_phones(&self, id: &str, phones: &[&str]) {
        self.phones.borrow_mut().insert(
            id.to_string(),
            phones.iter().map(|p| p.to_string()).collect(),
        );
    }

    pub fn set_image(&self, id: &str, raw: &str) {
        for contact in self.contacts.borrow_mut().iter_mut() {
            if contact.id == id {
                contact.image = Some(ImageRef::new(raw));
            }
        }
    }

    /// Hold the next call keyed by `key` (a name filter or an id) until the
    /// returned sender fires or is dropped.
    pub fn gate(&self, key: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.borrow_mut().insert(key.to_string(), rx);
        tx
    }

    async fn wait_gate(&self, key: &str) {
        let gate = self.gates.borrow_mut().remove(key);
        if let Some(rx) = gate {
            let _ = rx.await;
        }
    }
}

impl ContactSource for ScriptedSource {
    async fn request_authorization(&self) -> Authorization {
        self.authorization_calls.set(self.authorization_calls.get() + 1);
        self.authorization.get()
    }

    async fn query_contacts(&self, query: &ContactQuery) -> Result<Vec<RawContact>, SourceError> {
        self.query_calls.borrow_mut().push(query.name_filter.clone());
        self.wait_gate(&query.name_filter).await;
        if self.failing.get() {
            return Err(SourceError::Unavailable("scripted failure".into()));
        }
        let filter = search::normalize_query(&query.name_filter);
        Ok(self
            .contacts
            .borrow()
            .iter()
            .filter(|c| match &filter {
                Some(f) => search::matches(&c.name, f),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn contact_by_id(&self, id: &str) -> Result<RawContactDetail, SourceError> {
        self.detail_calls.borrow_mut().push(id.to_string());
        self.wait_gate(id).await;
        if self.failing.get() {
            return Err(SourceError::Unavailable("scripted failure".into()));
        }
        let contacts = self.contacts.borrow();
        let contact = contacts
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| SourceError::NotFound(id.to_string()))?;
        Ok(RawContactDetail {
            id: contact.id.clone(),
            name: contact.name.clone(),
            image: contact.image.clone(),
            phone_numbers: self.phones.borrow().get(id).cloned().unwrap_or_default(),
        })
    }
}
