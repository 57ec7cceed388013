mod result_set;

pub use result_set::ResultSet;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::export::{self, ExportPipe, NoteStream};
use crate::locator::Locator;
use crate::notes_db::{DbStats, NotesDb};
use crate::notify::{ChangeKind, NotificationBus, Subscription};
use crate::projection::ProjectionGuard;
use crate::query::{QueryBuilder, Selection};
use crate::record::{now_millis, Note, NoteValues};
use crate::route::{Route, RouteMatcher};
use crate::schema::{ContentType, NOTE_COLUMNS};
use crate::validation::{self, MutationKind};

/// The note store: the single gateway to the notes table.
///
/// Every caller-facing operation classifies its locator first and fails the
/// whole request on a locator it does not recognize. Mutations run one
/// statement each; concurrent writers are serialized by SQLite's own locking.
pub struct NoteStore {
    config: StoreConfig,
    db: NotesDb,
    routes: RouteMatcher,
    builder: QueryBuilder,
    bus: NotificationBus,
    export: ExportPipe,
}

impl NoteStore {
    /// Open (creating and migrating if needed) the store described by `config`.
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let db = NotesDb::from_config(&config)?;
        let routes = RouteMatcher::for_authority(&config.authority)?;
        let export = ExportPipe::new(config.export.clone());
        log::info!(
            "Opened note store {} at {}",
            config.authority,
            config.database
        );
        Ok(NoteStore {
            config,
            db,
            routes,
            builder: QueryBuilder::new(ProjectionGuard::new()),
            bus: NotificationBus::new(),
            export,
        })
    }

    /// A private in-memory store with default settings.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StoreConfig::in_memory())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn stats(&self) -> DbStats {
        self.db.stats()
    }

    /// Export writers still running.
    pub fn active_exports(&self) -> usize {
        self.export.active_writers()
    }

    pub fn schema_version(&self) -> Result<u32> {
        self.db.schema_version()
    }

    pub fn notes_locator(&self) -> Locator {
        Locator::notes(&self.config.authority)
    }

    pub fn note_locator(&self, id: i64) -> Locator {
        Locator::note(&self.config.authority, id)
    }

    pub fn live_folder_locator(&self) -> Locator {
        Locator::live_folder(&self.config.authority)
    }

    pub fn classify(&self, locator: &Locator) -> Route {
        self.routes.classify(locator)
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Run a read and return a live result set bound to `locator`.
    pub fn query(
        &self,
        locator: &Locator,
        columns: Option<&[&str]>,
        selection: Option<&Selection>,
        sort: Option<&str>,
    ) -> Result<ResultSet<'_>> {
        let route = self.routes.require(locator)?;
        let query = self
            .builder
            .build_read(locator, route, columns, selection, sort)?;
        ResultSet::open(self, locator.clone(), query)
    }

    /// The content type a locator resolves to.
    pub fn resolve_type(&self, locator: &Locator) -> Result<ContentType> {
        match self.routes.require(locator)? {
            Route::Collection | Route::AlternateView => Ok(ContentType::Collection),
            Route::ItemById(_) => Ok(ContentType::Item),
            Route::NoMatch => Err(StoreError::UnknownLocator(locator.to_string())),
        }
    }

    /// Stream kinds `locator` can be opened as, narrowed by `mime_filter`.
    /// Only single notes stream.
    pub fn stream_types(&self, locator: &Locator, mime_filter: &str) -> Result<Vec<&'static str>> {
        match self.routes.require(locator)? {
            Route::ItemById(_) => Ok(export::matching_kinds(mime_filter)),
            _ => Ok(Vec::new()),
        }
    }

    /// Start exporting one note as text and return the read end. Requires a
    /// tokio runtime; the writer runs on it concurrently with the caller.
    pub fn open_stream(&self, locator: &Locator, kind: &str) -> Result<NoteStream> {
        let route = self.routes.require(locator)?;
        let id = match route {
            Route::ItemById(id) if !export::matching_kinds(kind).is_empty() => id,
            _ => {
                return Err(StoreError::UnsupportedKind {
                    locator: locator.to_string(),
                    kind: kind.to_string(),
                });
            }
        };

        let note = self
            .load_note(locator, id)?
            .ok_or_else(|| StoreError::NotFound(locator.to_string()))?;
        self.export.spawn(&note)
    }

    fn load_note(&self, locator: &Locator, id: i64) -> Result<Option<Note>> {
        let all: Vec<&str> = NOTE_COLUMNS.iter().map(|c| c.name).collect();
        let query = self.builder.build_read(
            locator,
            Route::ItemById(id),
            Some(all.as_slice()),
            None,
            None,
        )?;
        let rows = self.db.select(&query)?;
        rows.first().map(Note::from_row).transpose()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Insert a note through the collection locator and return its item
    /// locator. Omitted fields get their defaults.
    pub fn insert(&self, locator: &Locator, values: &NoteValues) -> Result<Locator> {
        match self.routes.require(locator)? {
            Route::Collection => {}
            _ => return Err(StoreError::UnknownLocator(locator.to_string())),
        }

        let mut prepared = validation::validate_values(values, MutationKind::Insert)?;
        validation::apply_insert_defaults(&mut prepared, &self.config.untitled_title, now_millis());

        let id = self.db.insert(&prepared)?;
        if id <= 0 {
            return Err(StoreError::InsertFailed(locator.to_string()));
        }

        let item = locator.with_appended_id(id);
        self.notify_change(&item, ChangeKind::Inserted, 1);
        Ok(item)
    }

    /// Update the notes in scope and return how many changed. Without a
    /// filter, a collection locator updates every note.
    pub fn update(
        &self,
        locator: &Locator,
        values: &NoteValues,
        selection: Option<&Selection>,
    ) -> Result<usize> {
        let route = self.routes.require(locator)?;
        let scope = self.builder.build_scope(locator, route, selection)?;

        let mut prepared = validation::validate_values(values, MutationKind::Update)?;
        validation::apply_update_defaults(&mut prepared, now_millis());

        let count = self.db.update(&prepared, &scope)?;
        self.notify_change(locator, ChangeKind::Updated, count);
        Ok(count)
    }

    /// Delete the notes in scope and return how many were removed.
    pub fn delete(&self, locator: &Locator, selection: Option<&Selection>) -> Result<usize> {
        let route = self.routes.require(locator)?;
        let scope = self.builder.build_scope(locator, route, selection)?;

        let count = self.db.delete(&scope)?;
        self.notify_change(locator, ChangeKind::Deleted, count);
        Ok(count)
    }

    /// Register an observer on `locator`.
    pub fn subscribe(&self, locator: Locator, descendants: bool) -> Subscription {
        self.bus.subscribe(locator, descendants)
    }

    /// Signal the touched locator and the live view over the same table.
    fn notify_change(&self, touched: &Locator, kind: ChangeKind, affected: usize) {
        if !self.config.notify_policy.should_notify(affected) {
            log::debug!("{touched}: nothing changed, notification skipped");
            return;
        }
        let signaled = self
            .bus
            .notify(&[touched.clone(), self.live_folder_locator()], kind);
        log::debug!("{touched}: {kind:?}, {affected} row(s), {signaled} observer(s) signaled");
    }
}
