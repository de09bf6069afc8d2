use clap::{Parser, Subcommand, ValueEnum};
use serde_yaml::{Mapping, Value};
use std::process;
use textdb::Database;

/// TextDB CLI — work with a folder-backed text database from the command line
#[derive(Parser)]
#[command(name = "textdb", version, about)]
struct Cli {
    /// Path to the database root directory (default: current directory)
    #[arg(long, default_value = ".")]
    db: String,

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
    /// List all tables
    Tables,

    /// Show a table's schema (field name and kind, in declared order)
    Schema {
        /// Table name
        table: String,
    },

    /// List live record names in a table
    List {
        /// Table name
        table: String,
    },

    /// Get a single record by name
    Get {
        /// Table name
        table: String,
        /// Record name
        name: String,
    },

    /// Create a new (empty-schema) table
    AddTable {
        /// Table name
        name: String,
    },

    /// Remove a table; its files are deleted on save
    RemoveTable {
        /// Table name
        name: String,
    },

    /// Declare or redefine a field on a table
    DefineField {
        /// Table name
        table: String,
        /// Field name
        field: String,
        /// Kind: text, number, boolean, list, relation:<table>
        kind: String,
    },

    /// Drop a field from a table's schema; stored values are removed
    RemoveField {
        /// Table name
        table: String,
        /// Field name
        field: String,
    },

    /// Rename a field, keeping its kind and every record's stored value
    RenameField {
        /// Table name
        table: String,
        /// Current field name
        field: String,
        /// New field name
        new_name: String,
    },

    /// Declare a relation field pointing at another table
    DeclareRelation {
        /// Table name
        table: String,
        /// Target table name
        target: String,
    },

    /// Create a record
    Create {
        /// Table name
        table: String,
        /// Record name (slugified)
        name: String,
        /// Field values (e.g. --field pinned=true)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
        /// Read body content from a file
        #[arg(long)]
        content_file: Option<String>,
    },

    /// Edit an existing record
    Edit {
        /// Table name
        table: String,
        /// Record name
        name: String,
        /// Field values to merge (e.g. --field url=http://x)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
        /// Replace body content from a file
        #[arg(long)]
        content_file: Option<String>,
    },

    /// Remove a record; its file is deleted on save
    Remove {
        /// Table name
        table: String,
        /// Record name
        name: String,
    },

    /// Resolve a record's relation field to the records it points at
    Resolve {
        /// Table name
        table: String,
        /// Relation field name
        field: String,
        /// Record name
        name: String,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Database::open(&cli.db)?;
    for warning in db.warnings() {
        eprintln!("WARNING: {}: {}", warning.path.display(), warning.message);
    }

    match cli.command {
        Command::Tables => {
            print_output(&Value::Sequence(
                db.table_names().into_iter().map(Value::String).collect(),
            ), &cli.format);
        }

        Command::Schema { table } => {
            let mut mapping = Mapping::new();
            for field in db.table(&table)?.schema().fields() {
                mapping.insert(
                    Value::String(field.name.clone()),
                    Value::String(field.kind.kind_name()),
                );
            }
            print_output(&Value::Mapping(mapping), &cli.format);
        }

        Command::List { table } => {
            let names = db
                .table(&table)?
                .names()
                .into_iter()
                .map(|n| Value::String(n.to_string()))
                .collect();
            print_output(&Value::Sequence(names), &cli.format);
        }

        Command::Get { table, name } => {
            let snapshot = db.table(&table)?.get(&name)?;
            print_output(&serde_yaml::to_value(&snapshot)?, &cli.format);
        }

        Command::AddTable { name } => {
            db.add_table(&name)?;
            db.save()?;
        }

        Command::RemoveTable { name } => {
            db.remove_table(&name)?;
            db.save()?;
        }

        Command::DefineField { table, field, kind } => {
            db.table_mut(&table)?.define_field(&field, &kind)?;
            db.save()?;
        }

        Command::RemoveField { table, field } => {
            db.table_mut(&table)?.remove_field(&field)?;
            db.save()?;
        }

        Command::RenameField {
            table,
            field,
            new_name,
        } => {
            db.table_mut(&table)?.rename_field(&field, &new_name)?;
            db.save()?;
        }

        Command::DeclareRelation { table, target } => {
            db.table_mut(&table)?.declare_relation(&target)?;
            db.save()?;
        }

        Command::Create {
            table,
            name,
            fields,
            content_file,
        } => {
            let mut values = fields_to_mapping(&fields);
            if let Some(content) = read_content(content_file)? {
                values.insert(Value::String("content".into()), Value::String(content));
            }
            let created = db.table_mut(&table)?.create(&name, values)?;
            db.save()?;
            println!("{created}");
        }

        Command::Edit {
            table,
            name,
            fields,
            content_file,
        } => {
            let mut values = fields_to_mapping(&fields);
            if let Some(content) = read_content(content_file)? {
                values.insert(Value::String("content".into()), Value::String(content));
            }
            db.table_mut(&table)?.edit(&name, values)?;
            db.save()?;
        }

        Command::Remove { table, name } => {
            db.table_mut(&table)?.remove(&name)?;
            db.save()?;
        }

        Command::Resolve { table, field, name } => {
            let targets = db.resolve_relation(&table, &field, &name)?;
            print_output(&serde_yaml::to_value(&targets)?, &cli.format);
        }
    }

    Ok(())
}

fn print_output(value: &Value, format: &OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("ERROR: {e}"),
        },
        OutputFormat::Yaml => match serde_yaml::to_string(value) {
            Ok(s) => print!("{s}"),
            Err(e) => eprintln!("ERROR: {e}"),
        },
    }
}

/// Parse each `key=value` as a YAML scalar so `--field pinned=true` is a
/// boolean and `--field count=2` a number; anything unparseable stays a
/// plain string.
fn fields_to_mapping(fields: &[(String, String)]) -> Mapping {
    let mut mapping = Mapping::new();
    for (key, val) in fields {
        let parsed = serde_yaml::from_str(val).unwrap_or(Value::String(val.clone()));
        mapping.insert(Value::String(key.clone()), parsed);
    }
    mapping
}

fn read_content(content_file: Option<String>) -> Result<Option<String>, Box<dyn std::error::Error>> {
    match content_file {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read content file '{path}': {e}"))?;
            Ok(Some(content))
        }
        None => Ok(None),
    }
}
