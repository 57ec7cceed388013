// Locators: structured `scheme://authority/segment/...` addresses for notes

use crate::error::{Result, StoreError};
use crate::schema::{self, ITEM_ID_PATH_POSITION, PATH_LIVE_FOLDER, PATH_NOTES};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

fn locator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*)://(?P<authority>[^/?#\s]+)(?P<path>/[^?#\s]*)?$")
            .expect("locator pattern is a valid regex")
    })
}

/// An address of the whole note collection, a single note, or the live view.
///
/// Empty path segments are dropped on parse, so `content://a/notes/` and
/// `content://a/notes` are the same locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    scheme: String,
    authority: String,
    segments: Vec<String>,
}

impl Locator {
    /// Parse a locator string such as `content://com.google.provider.NotePad/notes/3`.
    pub fn parse(raw: &str) -> Result<Self> {
        let caps = locator_pattern()
            .captures(raw.trim())
            .ok_or_else(|| StoreError::MalformedLocator(raw.to_string()))?;

        let segments = caps
            .name("path")
            .map(|p| split_path(p.as_str()))
            .unwrap_or_default();

        Ok(Locator {
            scheme: caps["scheme"].to_ascii_lowercase(),
            authority: caps["authority"].to_string(),
            segments,
        })
    }

    /// Build a locator under the standard scheme from an authority and a path.
    pub fn new(authority: &str, path: &str) -> Self {
        Locator {
            scheme: schema::SCHEME.to_string(),
            authority: authority.to_string(),
            segments: split_path(path),
        }
    }

    /// The collection locator for an authority.
    pub fn notes(authority: &str) -> Self {
        Self::new(authority, PATH_NOTES)
    }

    /// The locator of one note.
    pub fn note(authority: &str, id: i64) -> Self {
        Self::notes(authority).with_appended_id(id)
    }

    /// The read-only live view locator for an authority.
    pub fn live_folder(authority: &str) -> Self {
        Self::new(authority, PATH_LIVE_FOLDER)
    }

    pub fn with_appended_id(&self, id: i64) -> Self {
        let mut segments = self.segments.clone();
        segments.push(id.to_string());
        Locator {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
            segments,
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn segment(&self, position: usize) -> Option<&str> {
        self.segments.get(position).map(String::as_str)
    }

    /// `/`-joined path, always with a leading slash.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    /// Identity embedded at the fixed item position.
    pub fn item_id(&self) -> Result<i64> {
        let segment = self.segment(ITEM_ID_PATH_POSITION).ok_or_else(|| {
            StoreError::MalformedLocator(format!("{self}: missing identity segment"))
        })?;
        segment.parse::<i64>().map_err(|_| {
            StoreError::MalformedLocator(format!("{self}: identity '{segment}' is not an integer"))
        })
    }

    /// True when `self` addresses a strict ancestor of `other`
    /// (same scheme and authority, and a proper prefix of its path).
    pub fn is_ancestor_of(&self, other: &Locator) -> bool {
        self.scheme == other.scheme
            && self.authority == other.authority
            && self.segments.len() < other.segments.len()
            && other.segments.starts_with(&self.segments)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)?;
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for Locator {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Locator::parse(s)
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
