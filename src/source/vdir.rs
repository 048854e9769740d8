//! Read-only contact source over a vdir (a directory tree of `.vcf` files).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::search;
use crate::vcard_io;

use super::{
    Authorization, ContactQuery, ContactSource, ImageRef, RawContact, RawContactDetail,
    SortOrder, SourceError,
};

#[derive(Debug, Clone)]
pub struct VdirSource {
    root: PathBuf,
    phone_region: Option<String>,
}

impl VdirSource {
    pub fn new(root: impl Into<PathBuf>, phone_region: Option<String>) -> Self {
        Self {
            root: root.into(),
            phone_region,
        }
    }

    async fn scan(&self) -> Result<Vec<RawContactDetail>, SourceError> {
        let root = self.root.clone();
        let region = self.phone_region.clone();
        tokio::task::spawn_blocking(move || scan_vdir(&root, region.as_deref()))
            .await
            .map_err(|err| SourceError::Unavailable(err.to_string()))?
            .map_err(|err| SourceError::Unavailable(format!("{err:#}")))
    }
}

impl ContactSource for VdirSource {
    async fn request_authorization(&self) -> Authorization {
        let root = self.root.clone();
        match tokio::task::spawn_blocking(move || check_access(&root)).await {
            Ok(authorization) => authorization,
            Err(err) => {
                warn!(vdir = %self.root.display(), error = %err, "authorization check did not complete");
                Authorization::Restricted
            }
        }
    }

    async fn query_contacts(&self, query: &ContactQuery) -> Result<Vec<RawContact>, SourceError> {
        let records = self.scan().await?;
        let filter = search::normalize_query(&query.name_filter);

        let mut contacts: Vec<(String, RawContact)> = records
            .into_iter()
            .filter(|record| match &filter {
                Some(f) => search::matches(&record.name, f),
                None => true,
            })
            .map(|record| {
                (
                    search::normalize(&record.name),
                    RawContact {
                        id: record.id,
                        name: record.name,
                        image: record.image,
                    },
                )
            })
            .collect();

        match query.order {
            SortOrder::NameAscending => contacts.sort_by(|(a_key, a), (b_key, b)| {
                a_key.cmp(b_key).then_with(|| a.id.cmp(&b.id))
            }),
        }

        Ok(contacts.into_iter().map(|(_, contact)| contact).collect())
    }

    async fn contact_by_id(&self, id: &str) -> Result<RawContactDetail, SourceError> {
        self.scan()
            .await?
            .into_iter()
            .find(|record| record.id == id)
            .ok_or_else(|| SourceError::NotFound(id.to_string()))
    }
}

fn check_access(root: &Path) -> Authorization {
    if !root.is_dir() {
        debug!(vdir = %root.display(), "vdir missing or not a directory");
        return Authorization::Restricted;
    }
    match fs::read_dir(root) {
        Ok(_) => Authorization::Granted,
        Err(err) if err.kind() == ErrorKind::PermissionDenied => Authorization::Denied,
        Err(err) => {
            warn!(vdir = %root.display(), error = %err, "vdir not readable");
            Authorization::Restricted
        }
    }
}

fn scan_vdir(root: &Path, region: Option<&str>) -> Result<Vec<RawContactDetail>> {
    let mut files = list_vcf_files(root)?;
    files.sort();

    let mut records = Vec::new();
    for path in files {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable vCard file");
                continue;
            }
        };
        let cards = match vcard_io::parse_str(&content) {
            Ok(cards) => cards,
            Err(err) => {
                let message = format!("{err:#}");
                warn!(path = %path.display(), error = %message, "skipping unparseable vCard file");
                continue;
            }
        };

        for (index, card) in cards.iter().enumerate() {
            let id = match vcard_io::card_uid(card) {
                Some(uid) => uid,
                None => {
                    let derived = derived_id(root, &path, index);
                    warn!(path = %path.display(), index, id = %derived, "card has no UID; using path-derived id");
                    derived
                }
            };
            records.push(RawContactDetail {
                id,
                name: vcard_io::display_name(card),
                image: vcard_io::photo_value(card).map(ImageRef::new),
                phone_numbers: vcard_io::phone_numbers(card, region),
            });
        }
    }

    Ok(records)
}

/// Stable id for a card lacking a UID: SHA-1 of its vdir-relative path and
/// position in the file.
fn derived_id(root: &Path, path: &Path, index: usize) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut hasher = Sha1::new();
    hasher.update(relative.to_string_lossy().as_bytes());
    hasher.update(index.to_le_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    format!("path-{}", &hex[..16])
}

pub fn list_vcf_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_vcf(root, &mut files)?;
    Ok(files)
}

fn collect_vcf(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read directory {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_vcf(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("vcf"))
            .unwrap_or(false)
        {
            files.push(path);
        }
    }
    Ok(())
}
