use super::NoteStore;
use crate::error::Result;
use crate::locator::Locator;
use crate::notify::Subscription;
use crate::query::ReadQuery;
use crate::record::Row;

/// A live read result, bound to the locator it was queried through.
///
/// The result set subscribes to its locator (and everything below it) before
/// the first read. When a mutation signals it, the rows are re-read on the
/// next access through [`ResultSet::rows`]; [`ResultSet::snapshot`] never
/// re-reads.
pub struct ResultSet<'a> {
    store: &'a NoteStore,
    locator: Locator,
    query: ReadQuery,
    rows: Vec<Row>,
    subscription: Subscription,
    stale: bool,
}

impl<'a> ResultSet<'a> {
    pub(super) fn open(store: &'a NoteStore, locator: Locator, query: ReadQuery) -> Result<Self> {
        let subscription = store.bus.subscribe(locator.clone(), true);
        let rows = store.db.select(&query)?;
        Ok(ResultSet {
            store,
            locator,
            query,
            rows,
            subscription,
            stale: false,
        })
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// External column names, in projection order.
    pub fn columns(&self) -> Vec<String> {
        self.query.column_names()
    }

    /// Whether a change was signaled since the last read.
    pub fn is_stale(&mut self) -> bool {
        if self.subscription.drain().is_empty() {
            self.stale
        } else {
            self.stale = true;
            true
        }
    }

    /// Re-run the query now.
    pub fn refresh(&mut self) -> Result<()> {
        self.subscription.drain();
        self.rows = self.store.db.select(&self.query)?;
        self.stale = false;
        log::debug!("result set for {} refreshed: {} row(s)", self.locator, self.rows.len());
        Ok(())
    }

    /// Current rows, re-read first if a change was signaled.
    pub fn rows(&mut self) -> Result<&[Row]> {
        if self.is_stale() {
            self.refresh()?;
        }
        Ok(&self.rows)
    }

    /// Rows as of the last read, without checking for changes.
    pub fn snapshot(&self) -> &[Row] {
        &self.rows
    }

    /// The rows as JSON objects, for display.
    pub fn to_json(&mut self) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Array(
            self.rows()?.iter().map(Row::to_json).collect(),
        ))
    }
}

impl std::fmt::Debug for ResultSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("locator", &self.locator)
            .field("sql", &self.query.sql)
            .field("rows", &self.rows.len())
            .field("stale", &self.stale)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::NoteValues;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_refresh_on_change() {
        let store = NoteStore::open_in_memory().unwrap();
        let notes = store.notes_locator();
        let mut rs = store.query(&notes, None, None, None).unwrap();
        assert!(rs.rows().unwrap().is_empty());

        store.insert(&notes, &NoteValues::new().title("a")).unwrap();
        assert_eq!(rs.snapshot().len(), 0);
        assert!(rs.is_stale());
        assert_eq!(rs.rows().unwrap().len(), 1);
        assert!(!rs.is_stale());
    }

    #[test]
    fn test_no_reread_without_change() {
        let store = NoteStore::open_in_memory().unwrap();
        let notes = store.notes_locator();
        let mut rs = store.query(&notes, None, None, None).unwrap();
        let reads = store.stats().reads;
        rs.rows().unwrap();
        rs.rows().unwrap();
        assert_eq!(store.stats().reads, reads);

        rs.refresh().unwrap();
        assert_eq!(store.stats().reads, reads + 1);
    }

    #[test]
    fn test_item_result_set_sees_collection_update() {
        let store = NoteStore::open_in_memory().unwrap();
        let notes = store.notes_locator();
        let item = store.insert(&notes, &NoteValues::new().title("old")).unwrap();
        let mut rs = store.query(&item, Some(&["title"][..]), None, None).unwrap();

        store
            .update(&notes, &NoteValues::new().title("new"), None)
            .unwrap();
        assert_eq!(rs.rows().unwrap()[0].get_str("title"), Some("new"));
    }

    #[test]
    fn test_live_view_result_set_is_refreshed() {
        let store = NoteStore::open_in_memory().unwrap();
        let mut live = store
            .query(&store.live_folder_locator(), None, None, None)
            .unwrap();
        store
            .insert(&store.notes_locator(), &NoteValues::new().title("a"))
            .unwrap();
        let json = live.to_json().unwrap();
        assert_eq!(json, serde_json::json!([{"_id": 1, "name": "a"}]));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let store = NoteStore::open_in_memory().unwrap();
        let rs = store.query(&store.notes_locator(), None, None, None).unwrap();
        assert_eq!(store.bus().observer_count(), 1);
        drop(rs);
        assert_eq!(store.bus().observer_count(), 0);
    }
}
