// Projection guard: per-route whitelist of readable columns and their aliases

use crate::error::{Result, StoreError};
use crate::locator::Locator;
use crate::route::RouteKind;
use crate::schema::{columns, live_columns, NOTE_COLUMNS};

/// One column of a result, as the caller sees it and as the table stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedColumn {
    /// Name exposed to the caller.
    pub external: String,
    /// Internal column in the notes table.
    pub column: &'static str,
}

impl ProjectedColumn {
    /// SQL select-list expression for this column.
    pub fn select_expr(&self) -> String {
        if self.external == self.column {
            self.column.to_string()
        } else {
            format!("{} AS {}", self.column, self.external)
        }
    }
}

/// The authoritative external-name → internal-column mapping for a route.
#[derive(Debug, Clone)]
pub struct ProjectionMap {
    entries: Vec<(String, &'static str)>,
    defaults: Vec<String>,
}

impl ProjectionMap {
    /// Every note column under its own name. Defaults to the minimal
    /// id/title/body/color subset.
    pub fn notes() -> Self {
        ProjectionMap {
            entries: NOTE_COLUMNS
                .iter()
                .map(|c| (c.name.to_string(), c.name))
                .collect(),
            defaults: [columns::ID, columns::TITLE, columns::BODY, columns::COLOR]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// The live view: identity and title, under fixed aliases.
    pub fn live_folder() -> Self {
        ProjectionMap {
            entries: vec![
                (live_columns::ID.to_string(), columns::ID),
                (live_columns::NAME.to_string(), columns::TITLE),
            ],
            defaults: vec![live_columns::ID.to_string(), live_columns::NAME.to_string()],
        }
    }

    /// Internal column for an external name, if whitelisted.
    pub fn get(&self, external: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(name, _)| name == external)
            .map(|(_, column)| *column)
    }

    pub fn external_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Resolve the caller's column request. `None` or an empty list selects
    /// the map's default subset; any name outside the map is rejected.
    pub fn resolve(
        &self,
        locator: &Locator,
        requested: Option<&[&str]>,
    ) -> Result<Vec<ProjectedColumn>> {
        let names: Vec<&str> = match requested {
            Some(cols) if !cols.is_empty() => cols.to_vec(),
            _ => self.defaults.iter().map(String::as_str).collect(),
        };

        names
            .into_iter()
            .map(|name| {
                self.get(name)
                    .map(|column| ProjectedColumn {
                        external: name.to_string(),
                        column,
                    })
                    .ok_or_else(|| StoreError::InvalidProjection {
                        locator: locator.to_string(),
                        column: name.to_string(),
                    })
            })
            .collect()
    }
}

/// Holds the projection maps of every route kind. Constructed once per store.
#[derive(Debug, Clone)]
pub struct ProjectionGuard {
    notes: ProjectionMap,
    live_folder: ProjectionMap,
}

impl ProjectionGuard {
    pub fn new() -> Self {
        ProjectionGuard {
            notes: ProjectionMap::notes(),
            live_folder: ProjectionMap::live_folder(),
        }
    }

    pub fn map_for(&self, kind: RouteKind) -> &ProjectionMap {
        match kind {
            RouteKind::Collection | RouteKind::ItemById => &self.notes,
            RouteKind::AlternateView => &self.live_folder,
        }
    }

    pub fn resolve(
        &self,
        kind: RouteKind,
        locator: &Locator,
        requested: Option<&[&str]>,
    ) -> Result<Vec<ProjectedColumn>> {
        self.map_for(kind).resolve(locator, requested)
    }
}

impl Default for ProjectionGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AUTHORITY;
    use pretty_assertions::assert_eq;

    fn externals(cols: &[ProjectedColumn]) -> Vec<&str> {
        cols.iter().map(|c| c.external.as_str()).collect()
    }

    #[test]
    fn test_default_subset_for_notes() {
        let guard = ProjectionGuard::new();
        let loc = Locator::notes(AUTHORITY);
        let cols = guard.resolve(RouteKind::Collection, &loc, None).unwrap();
        assert_eq!(externals(&cols), vec!["id", "title", "body", "color"]);

        let cols = guard.resolve(RouteKind::ItemById, &loc, Some(&[])).unwrap();
        assert_eq!(externals(&cols), vec!["id", "title", "body", "color"]);
    }

    #[test]
    fn test_full_column_set_is_readable() {
        let guard = ProjectionGuard::new();
        let loc = Locator::notes(AUTHORITY);
        let all: Vec<&str> = NOTE_COLUMNS.iter().map(|c| c.name).collect();
        let cols = guard.resolve(RouteKind::Collection, &loc, Some(&all)).unwrap();
        assert_eq!(cols.len(), 7);
        assert!(cols.iter().all(|c| c.external == c.column));
        assert_eq!(cols[3].select_expr(), "created");
    }

    #[test]
    fn test_live_folder_aliases() {
        let guard = ProjectionGuard::new();
        let loc = Locator::live_folder(AUTHORITY);
        let cols = guard.resolve(RouteKind::AlternateView, &loc, None).unwrap();
        assert_eq!(externals(&cols), vec!["_id", "name"]);
        assert_eq!(cols[0].select_expr(), "id AS _id");
        assert_eq!(cols[1].select_expr(), "title AS name");
    }

    #[test]
    fn test_rejects_columns_outside_the_map() {
        let guard = ProjectionGuard::new();
        let loc = Locator::live_folder(AUTHORITY);
        let err = guard
            .resolve(RouteKind::AlternateView, &loc, Some(&["_id", "body"]))
            .unwrap_err();
        match err {
            StoreError::InvalidProjection { column, .. } => assert_eq!(column, "body"),
            other => panic!("unexpected error: {other}"),
        }

        let loc = Locator::notes(AUTHORITY);
        let err = guard
            .resolve(RouteKind::Collection, &loc, Some(&["title", "sqlite_master.sql"]))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidProjection { .. }));
    }
}
