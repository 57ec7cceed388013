pub mod config;
pub mod error;
pub mod export;
pub mod locator;
pub mod migration;
pub mod notes_db;
pub mod notify;
pub mod projection;
pub mod query;
pub mod record;
pub mod route;
pub mod schema;
pub mod store;
pub mod validation;

pub use config::{NotifyPolicy, StoreConfig};
pub use error::{Result, StoreError};
pub use export::NoteStream;
pub use locator::Locator;
pub use notify::{ChangeEvent, ChangeKind, Subscription};
pub use query::Selection;
pub use record::{Note, NoteValues, Row};
pub use route::{Route, RouteKind};
pub use schema::{ContentType, NoteColor};
pub use store::{NoteStore, ResultSet};
