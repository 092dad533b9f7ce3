//! Contact extraction from a source document.
//!
//! The document is reduced to plain text first (PDF via `pdf-extract`, any
//! other file read as UTF-8), then scanned line by line: the first
//! whitespace-separated token containing `@` is the address and the rest of
//! the line is a best-effort display name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::ConfigError;

/// One extracted recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub email: String,
    pub display_name: String,
}

/// Contacts keyed by address, in first-seen order.
///
/// A repeated address keeps its original position and takes the latest
/// display name.
#[derive(Debug, Clone, Default)]
pub struct Contacts {
    entries: Vec<Contact>,
    index: HashMap<String, usize>,
}

impl Contacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, email: impl Into<String>, display_name: impl Into<String>) {
        let email = email.into();
        let display_name = display_name.into();
        match self.index.get(&email) {
            Some(&pos) => self.entries[pos].display_name = display_name,
            None => {
                self.index.insert(email.clone(), self.entries.len());
                self.entries.push(Contact { email, display_name });
            }
        }
    }

    pub fn get(&self, email: &str) -> Option<&Contact> {
        self.index.get(email).map(|&pos| &self.entries[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E: Into<String>, N: Into<String>> FromIterator<(E, N)> for Contacts {
    fn from_iter<I: IntoIterator<Item = (E, N)>>(iter: I) -> Self {
        let mut contacts = Contacts::new();
        for (email, name) in iter {
            contacts.insert(email, name);
        }
        contacts
    }
}

/// Scan document text for contacts.
pub fn extract_contacts(text: &str) -> Contacts {
    let mut contacts = Contacts::new();

    for line in text.lines().filter(|l| l.contains('@')) {
        let Some(token) = line.split_whitespace().find(|part| part.contains('@')) else {
            continue;
        };
        let email = token.trim_matches(',');
        if email.is_empty() {
            continue;
        }
        let name = line.replace(email, "");
        contacts.insert(email, name.trim());
    }

    contacts
}

/// A document on disk that contacts are extracted from.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    path: PathBuf,
}

impl DocumentSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extract all contacts, failing if the document is missing, unreadable
    /// or yields no addresses.
    pub fn load(&self) -> Result<Contacts, ConfigError> {
        if !self.path.exists() {
            return Err(ConfigError::MissingSource(self.path.clone()));
        }

        let text = self.read_text()?;
        debug!(path = %self.path.display(), text_length = text.len(), "contact_source_read");

        let contacts = extract_contacts(&text);
        if contacts.is_empty() {
            return Err(ConfigError::NoContacts(self.path.clone()));
        }

        info!(
            path = %self.path.display(),
            contacts = contacts.len(),
            "contacts_extracted"
        );
        Ok(contacts)
    }

    fn read_text(&self) -> Result<String, ConfigError> {
        let is_pdf = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

        let result = if is_pdf {
            pdf_extract::extract_text(&self.path).map_err(|e| e.to_string())
        } else {
            std::fs::read_to_string(&self.path).map_err(|e| e.to_string())
        };

        result.map_err(|reason| ConfigError::UnreadableSource {
            path: self.path.clone(),
            reason,
        })
    }
}
