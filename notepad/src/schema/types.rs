use serde::{Deserialize, Serialize};

/// Default authority of note locators.
pub const AUTHORITY: &str = "com.google.provider.NotePad";

/// Locator scheme shared by every route.
pub const SCHEME: &str = "content";

/// The single backing table.
pub const TABLE_NAME: &str = "notes";

/// Path of the note collection (`content://<authority>/notes`).
pub const PATH_NOTES: &str = "notes";

/// Path of the read-only live view (`content://<authority>/live_folders/notes`).
pub const PATH_LIVE_FOLDER: &str = "live_folders/notes";

/// Position of the identity segment in an item locator path.
pub const ITEM_ID_PATH_POSITION: usize = 1;

/// Most recently modified first.
pub const DEFAULT_SORT_ORDER: &str = "modified DESC";

/// Category assigned to notes inserted without one.
pub const DEFAULT_CATEGORY: &str = "task";

/// Fallback for the localized "untitled" string.
pub const DEFAULT_UNTITLED: &str = "<Untitled>";

/// Internal column names of the `notes` table.
pub mod columns {
    pub const ID: &str = "id";
    pub const TITLE: &str = "title";
    pub const BODY: &str = "body";
    pub const CREATED: &str = "created";
    pub const MODIFIED: &str = "modified";
    pub const COLOR: &str = "color";
    pub const CATEGORY: &str = "category";
}

/// Column aliases exposed by the live view.
pub mod live_columns {
    pub const ID: &str = "_id";
    pub const NAME: &str = "name";
}

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
}

/// When callers may supply a value for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Writability {
    /// Allocated by the store, never caller-supplied.
    Never,
    /// Settable on insert only.
    InsertOnly,
    /// Settable on insert and update.
    Always,
}

/// Static description of one column of the notes table.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDefinition {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub writability: Writability,
}

/// Every column of the notes table, in table order.
pub const NOTE_COLUMNS: &[ColumnDefinition] = &[
    ColumnDefinition {
        name: columns::ID,
        column_type: ColumnType::Integer,
        nullable: false,
        writability: Writability::Never,
    },
    ColumnDefinition {
        name: columns::TITLE,
        column_type: ColumnType::Text,
        nullable: true,
        writability: Writability::Always,
    },
    ColumnDefinition {
        name: columns::BODY,
        column_type: ColumnType::Text,
        nullable: true,
        writability: Writability::Always,
    },
    ColumnDefinition {
        name: columns::CREATED,
        column_type: ColumnType::Integer,
        nullable: false,
        writability: Writability::InsertOnly,
    },
    ColumnDefinition {
        name: columns::MODIFIED,
        column_type: ColumnType::Integer,
        nullable: false,
        writability: Writability::Always,
    },
    ColumnDefinition {
        name: columns::COLOR,
        column_type: ColumnType::Integer,
        nullable: true,
        writability: Writability::Always,
    },
    ColumnDefinition {
        name: columns::CATEGORY,
        column_type: ColumnType::Text,
        nullable: true,
        writability: Writability::Always,
    },
];

/// Look up a column definition by internal name.
pub fn column(name: &str) -> Option<&'static ColumnDefinition> {
    NOTE_COLUMNS.iter().find(|c| c.name == name)
}

/// Background color tag of a note.
///
/// The store persists whatever integer a caller writes; renderers go through
/// [`NoteColor::from_tag`], which maps unknown tags to `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteColor {
    #[default]
    Default,
    Yellow,
    Blue,
    Green,
    Red,
}

impl NoteColor {
    pub const ALL: [NoteColor; 5] = [
        NoteColor::Default,
        NoteColor::Yellow,
        NoteColor::Blue,
        NoteColor::Green,
        NoteColor::Red,
    ];

    /// The persisted integer tag.
    pub fn tag(self) -> i64 {
        match self {
            NoteColor::Default => 0,
            NoteColor::Yellow => 1,
            NoteColor::Blue => 2,
            NoteColor::Green => 3,
            NoteColor::Red => 4,
        }
    }

    /// Map a persisted tag back to a color. Unknown tags render as `Default`.
    pub fn from_tag(tag: i64) -> Self {
        Self::ALL
            .into_iter()
            .find(|c| c.tag() == tag)
            .unwrap_or_default()
    }

    pub fn name(self) -> &'static str {
        match self {
            NoteColor::Default => "default",
            NoteColor::Yellow => "yellow",
            NoteColor::Blue => "blue",
            NoteColor::Green => "green",
            NoteColor::Red => "red",
        }
    }
}

/// Result of `resolve_type`: whether a locator addresses many notes or one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Collection,
    Item,
}

impl ContentType {
    pub fn mime(self) -> &'static str {
        match self {
            ContentType::Collection => "vnd.android.cursor.dir/vnd.google.note",
            ContentType::Item => "vnd.android.cursor.item/vnd.google.note",
        }
    }
}
