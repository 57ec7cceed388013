use clap::{Parser, Subcommand, ValueEnum};
use notepad::migration;
use notepad::schema::{self, ColumnType};
use notepad::{Locator, NoteStore, NoteValues, Selection, StoreConfig};
use std::path::PathBuf;
use std::process;

/// notepad: read and write a note store from the command line
#[derive(Parser)]
#[command(name = "notepad", version, about)]
struct Cli {
    /// Store configuration file (YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database file, overriding the configuration
    #[arg(long)]
    database: Option<String>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Read notes through a locator
    Query {
        /// Locator, either `content://authority/notes/1` or a path like `notes/1`
        locator: String,
        /// Columns to return (repeatable)
        #[arg(long = "column")]
        columns: Vec<String>,
        /// Filter expression, or free text to search titles and bodies
        #[arg(long)]
        filter: Option<String>,
        /// Filter arguments, bound to `?` in order
        #[arg(long = "arg")]
        args: Vec<String>,
        /// Sort order (e.g. "title ASC")
        #[arg(long)]
        sort: Option<String>,
    },

    /// Insert a note
    Insert {
        /// Field values (e.g. --field title=Groceries)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Update notes
    Update {
        locator: String,
        /// Field values to update (e.g. --field color=2)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long = "arg")]
        args: Vec<String>,
    },

    /// Delete notes
    Delete {
        locator: String,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long = "arg")]
        args: Vec<String>,
    },

    /// Show the content type of a locator
    Type { locator: String },

    /// Write a single note as text to stdout
    Export {
        locator: String,
        /// Requested stream kind
        #[arg(long, default_value = "text/plain")]
        kind: String,
    },

    /// Apply pending schema migrations
    Migrate {
        /// Show what would run without applying
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<StoreConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::from_file(path)?,
        None => StoreConfig::default(),
    };
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    config.validate()?;
    log::debug!("using database {}", config.database);
    Ok(config)
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&cli)?;

    if let Command::Migrate { dry_run } = &cli.command {
        return migrate(config, *dry_run, &cli.format);
    }

    let store = NoteStore::open(config)?;

    match &cli.command {
        Command::Query {
            locator,
            columns,
            filter,
            args,
            sort,
        } => {
            let locator = parse_locator(&store, locator)?;
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            let selection = selection(filter.as_deref(), args);
            let mut rows = store.query(
                &locator,
                Some(columns.as_slice()),
                selection.as_ref(),
                sort.as_deref(),
            )?;
            print_output(&rows.to_json()?, &cli.format)?;
        }

        Command::Insert { fields } => {
            let values = NoteValues::from_json(fields_to_value(fields))?;
            let item = store.insert(&store.notes_locator(), &values)?;
            print_output(
                &serde_json::json!({ "locator": item.to_string() }),
                &cli.format,
            )?;
        }

        Command::Update {
            locator,
            fields,
            filter,
            args,
        } => {
            let locator = parse_locator(&store, locator)?;
            let values = NoteValues::from_json(fields_to_value(fields))?;
            let selection = selection(filter.as_deref(), args);
            let count = store.update(&locator, &values, selection.as_ref())?;
            print_output(&serde_json::json!({ "updated": count }), &cli.format)?;
        }

        Command::Delete {
            locator,
            filter,
            args,
        } => {
            let locator = parse_locator(&store, locator)?;
            let selection = selection(filter.as_deref(), args);
            let count = store.delete(&locator, selection.as_ref())?;
            print_output(&serde_json::json!({ "deleted": count }), &cli.format)?;
        }

        Command::Type { locator } => {
            let locator = parse_locator(&store, locator)?;
            let content_type = store.resolve_type(&locator)?;
            let kinds = store.stream_types(&locator, "*/*")?;
            print_output(
                &serde_json::json!({ "type": content_type.mime(), "streams": kinds }),
                &cli.format,
            )?;
        }

        Command::Export { locator, kind } => {
            let locator = parse_locator(&store, locator)?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let text = runtime.block_on(async {
                let stream = store.open_stream(&locator, kind)?;
                stream.read_to_string().await
            })?;
            print!("{text}");
        }

        // handled before the store is opened
        Command::Migrate { .. } => {}
    }

    Ok(())
}

fn migrate(
    config: StoreConfig,
    dry_run: bool,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let current = match config.database_path() {
        Some(path) => migration::version_at(&path)?,
        None => 0,
    };
    let pending: Vec<String> = migration::pending_migrations(current)?
        .iter()
        .map(|m| m.describe())
        .collect();

    if dry_run {
        return print_output(
            &serde_json::json!({
                "dry_run": true,
                "current_version": current,
                "pending": pending,
            }),
            format,
        );
    }

    let store = NoteStore::open(config)?;
    print_output(
        &serde_json::json!({
            "ok": true,
            "version": store.schema_version()?,
            "applied": pending,
        }),
        format,
    )
}

/// Accept a full locator or a bare path under the configured authority.
fn parse_locator(store: &NoteStore, raw: &str) -> Result<Locator, Box<dyn std::error::Error>> {
    if raw.contains("://") {
        Ok(Locator::parse(raw)?)
    } else {
        Ok(Locator::new(&store.config().authority, raw))
    }
}

fn selection(filter: Option<&str>, args: &[String]) -> Option<Selection> {
    filter.map(|f| {
        let parsed = args.iter().map(String::as_str).map(parse_scalar).collect();
        Selection::from_parts(Some(f), parsed)
    })
}

fn parse_scalar(raw: &str) -> serde_json::Value {
    // Numbers, booleans and null parse as JSON; everything else is text
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

/// Text columns take the raw string (`title=123` is the title "123");
/// everything else is parsed as a scalar.
fn fields_to_value(fields: &[(String, String)]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (key, val) in fields {
        let value = match schema::column(key) {
            Some(column) if column.column_type == ColumnType::Text => {
                serde_json::Value::String(val.clone())
            }
            _ => parse_scalar(val),
        };
        map.insert(key.clone(), value);
    }
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_text_fields_stay_text() {
        let value = fields_to_value(&pairs(&[
            ("title", "123"),
            ("body", "true"),
            ("color", "2"),
            ("created", "1700000000000"),
        ]));
        assert_eq!(
            value,
            json!({
                "title": "123",
                "body": "true",
                "color": 2,
                "created": 1_700_000_000_000_i64,
            })
        );
        assert!(NoteValues::from_json(value).is_ok());
    }

    #[test]
    fn test_numeric_title_inserts() {
        let store = NoteStore::open_in_memory().unwrap();
        let values = NoteValues::from_json(fields_to_value(&pairs(&[("title", "123")]))).unwrap();
        let item = store.insert(&store.notes_locator(), &values).unwrap();
        let mut rows = store.query(&item, Some(&["title"][..]), None, None).unwrap();
        assert_eq!(rows.rows().unwrap()[0].get_str("title"), Some("123"));
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("title=a=b").unwrap(),
            ("title".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("title").is_err());
    }
}
