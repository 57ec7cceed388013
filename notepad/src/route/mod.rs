// Route matching: classify a locator into one of the closed set of route kinds

use crate::error::{Result, StoreError};
use crate::locator::Locator;
use crate::schema::{PATH_LIVE_FOLDER, PATH_NOTES, SCHEME};

/// The kinds of routes a matcher can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    Collection,
    ItemById,
    AlternateView,
}

/// The classification of a single locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Collection,
    ItemById(i64),
    AlternateView,
    NoMatch,
}

impl Route {
    pub fn kind(self) -> Option<RouteKind> {
        match self {
            Route::Collection => Some(RouteKind::Collection),
            Route::ItemById(_) => Some(RouteKind::ItemById),
            Route::AlternateView => Some(RouteKind::AlternateView),
            Route::NoMatch => None,
        }
    }

    pub fn item_id(self) -> Option<i64> {
        match self {
            Route::ItemById(id) => Some(id),
            _ => None,
        }
    }
}

/// One segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSegment {
    /// Must equal the locator segment exactly.
    Literal(String),
    /// `#`: a non-negative decimal integer.
    Number,
    /// `*`: any single segment.
    Text,
}

impl PatternSegment {
    fn matches(&self, segment: &str) -> bool {
        match self {
            PatternSegment::Literal(lit) => lit == segment,
            PatternSegment::Number => {
                !segment.is_empty()
                    && segment.bytes().all(|b| b.is_ascii_digit())
                    && segment.parse::<i64>().is_ok()
            }
            PatternSegment::Text => true,
        }
    }
}

#[derive(Debug, Clone)]
struct RoutePattern {
    authority: String,
    segments: Vec<PatternSegment>,
    kind: RouteKind,
}

/// Pattern table mapping locators to route kinds.
///
/// Built once when the store opens and read-only afterwards. Patterns are
/// tried in registration order; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct RouteMatcher {
    patterns: Vec<RoutePattern>,
}

impl RouteMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard note routes for an authority:
    /// `notes`, `notes/#` and `live_folders/notes`.
    pub fn for_authority(authority: &str) -> Result<Self> {
        let mut matcher = Self::new();
        matcher.add(authority, PATH_NOTES, RouteKind::Collection)?;
        matcher.add(authority, &format!("{PATH_NOTES}/#"), RouteKind::ItemById)?;
        matcher.add(authority, PATH_LIVE_FOLDER, RouteKind::AlternateView)?;
        Ok(matcher)
    }

    /// Register a pattern such as `notes/#`.
    ///
    /// An `ItemById` pattern must have a `#` segment at the identity position.
    pub fn add(&mut self, authority: &str, pattern: &str, kind: RouteKind) -> Result<()> {
        let segments: Vec<PatternSegment> = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s {
                "#" => PatternSegment::Number,
                "*" => PatternSegment::Text,
                lit => PatternSegment::Literal(lit.to_string()),
            })
            .collect();

        if segments.is_empty() {
            return Err(StoreError::Config(format!("empty route pattern for {kind:?}")));
        }
        if kind == RouteKind::ItemById
            && segments.get(crate::schema::ITEM_ID_PATH_POSITION) != Some(&PatternSegment::Number)
        {
            return Err(StoreError::Config(format!(
                "item route '{pattern}' needs '#' at segment {}",
                crate::schema::ITEM_ID_PATH_POSITION
            )));
        }

        self.patterns.push(RoutePattern {
            authority: authority.to_string(),
            segments,
            kind,
        });
        Ok(())
    }

    /// Classify a locator. Never fails: anything unrecognized is `NoMatch`.
    pub fn classify(&self, locator: &Locator) -> Route {
        let matched = self.patterns.iter().find(|p| {
            locator.scheme() == SCHEME
                && p.authority == locator.authority()
                && p.segments.len() == locator.segments().len()
                && p.segments
                    .iter()
                    .zip(locator.segments())
                    .all(|(pat, seg)| pat.matches(seg))
        });

        let route = match matched.map(|p| p.kind) {
            Some(RouteKind::Collection) => Route::Collection,
            Some(RouteKind::AlternateView) => Route::AlternateView,
            Some(RouteKind::ItemById) => match locator.item_id() {
                Ok(id) => Route::ItemById(id),
                Err(_) => Route::NoMatch,
            },
            None => Route::NoMatch,
        };
        log::debug!("route {locator} -> {route:?}");
        route
    }

    /// Classify, turning `NoMatch` into an error: `MalformedLocator` when the
    /// locator has the shape of an item route but a bad identity segment,
    /// `UnknownLocator` otherwise.
    pub fn require(&self, locator: &Locator) -> Result<Route> {
        match self.classify(locator) {
            Route::NoMatch if self.has_item_shape(locator) => Err(StoreError::MalformedLocator(
                format!("{locator}: identity segment is not a non-negative integer"),
            )),
            Route::NoMatch => Err(StoreError::UnknownLocator(locator.to_string())),
            route => Ok(route),
        }
    }

    fn has_item_shape(&self, locator: &Locator) -> bool {
        locator.scheme() == SCHEME
            && self.patterns.iter().any(|p| {
                p.kind == RouteKind::ItemById
                    && p.authority == locator.authority()
                    && p.segments.len() == locator.segments().len()
                    && p.segments
                        .iter()
                        .zip(locator.segments())
                        .all(|(pat, seg)| *pat == PatternSegment::Number || pat.matches(seg))
            })
    }
}
