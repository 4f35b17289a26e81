use burrow::{Config, Database, SortDescriptor};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process;

/// Burrow CLI: inspect and edit a Burrow store from the command line
#[derive(Parser)]
#[command(name = "burrow", version, about)]
struct Cli {
    /// Store file (default: $BURROW_DATA_DIR/default.burrow)
    #[arg(long)]
    path: Option<PathBuf>,

    /// schema.yaml to open the store with (default: the schema stored in the file)
    #[arg(long)]
    schema: Option<PathBuf>,

    /// YAML config file; --path and --schema override its values
    #[arg(long)]
    config: Option<PathBuf>,

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
    /// Show the store version, schema hash and object counts
    Status,

    /// Print the schema the store is using
    Schema,

    /// List objects of a class, optionally filtered
    Query {
        /// Class name
        class: String,
        /// Predicate, e.g. "name CONTAINS 'x' AND age > 8"
        predicate: Option<String>,
        /// Sort by this property
        #[arg(long)]
        sort: Option<String>,
        /// Sort descending
        #[arg(long)]
        desc: bool,
    },

    /// Count objects of a class, optionally filtered
    Count {
        /// Class name
        class: String,
        /// Predicate
        predicate: Option<String>,
    },

    /// Get a single object by id
    Get {
        /// Class name
        class: String,
        /// Object id
        id: String,
    },

    /// Insert a new object
    Insert {
        /// Class name
        class: String,
        /// Property values (e.g. --field name=Rex --field age=9)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Delete an object, applying delete policies
    Delete {
        /// Class name
        class: String,
        /// Object id
        id: String,
        /// Show what would be deleted, unlinked or blocking, without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Check all stored objects against the schema
    Validate,

    /// Dump every object of a class
    Export {
        /// Class name
        class: String,
    },

    /// Migrate the store to the schema given with --schema
    Migrate {
        /// Show the changes without applying them
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
        // Machine-readable error on stderr
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn base_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(file) => Config::from_yaml_file(file)?,
        None => Config::default(),
    };
    if let Some(path) = &cli.path {
        config.path = path.clone();
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Command::Migrate { dry_run } = &cli.command {
        return migrate(&cli, *dry_run);
    }

    let mut config = base_config(&cli)?;
    if let Some(schema) = &cli.schema {
        config = config.schema_file(schema);
    }
    let db = Database::open(config)?;

    match &cli.command {
        Command::Status => print_output(&db.status()?, &cli.format)?,

        Command::Schema => print_output(db.schema(), &cli.format)?,

        Command::Query {
            class,
            predicate,
            sort,
            desc,
        } => {
            let sort: Vec<SortDescriptor> = sort
                .iter()
                .map(|prop| SortDescriptor::new(prop, !desc))
                .collect();
            let objects = db.query_dynamic(class, predicate.as_deref(), &sort)?;
            print_output(&objects, &cli.format)?;
        }

        Command::Count { class, predicate } => {
            let count = db.count_dynamic(class, predicate.as_deref())?;
            print_output(&serde_json::json!({ "class": class, "count": count }), &cli.format)?;
        }

        Command::Get { class, id } => {
            let object = db
                .get_dynamic(class, id)?
                .ok_or_else(|| burrow::BurrowError::NotFound {
                    class: class.clone(),
                    id: id.clone(),
                })?;
            print_output(&object, &cli.format)?;
        }

        Command::Insert { class, fields } => {
            let id = db.insert_dynamic(class, fields_to_value(fields))?;
            print_output(&serde_json::json!({ "id": id.as_str() }), &cli.format)?;
        }

        Command::Delete { class, id, dry_run } => {
            if *dry_run {
                let plan = db.plan_delete(class, id)?;
                print_output(
                    &serde_json::json!({
                        "dry_run": true,
                        "ok": !plan.is_blocked(),
                        "would_delete": plan.deleted,
                        "would_unlink": plan.unlinked,
                        "blocked_by": plan.blocked_by,
                    }),
                    &cli.format,
                )?;
            } else {
                db.delete_dynamic(class, id)?;
                print_output(&serde_json::json!({ "ok": true, "deleted": id }), &cli.format)?;
            }
        }

        Command::Validate => {
            let issues: Vec<_> = db
                .validate_all()?
                .into_iter()
                .map(|issue| {
                    serde_json::json!({
                        "class": issue.class,
                        "id": issue.id.as_str(),
                        "errors": issue.result.errors,
                        "warnings": issue.result.warnings,
                    })
                })
                .collect();
            print_output(
                &serde_json::json!({ "ok": issues.is_empty(), "issues": issues }),
                &cli.format,
            )?;
        }

        Command::Export { class } => {
            let objects = db.query_dynamic(class, None, &[])?;
            print_output(&objects, &cli.format)?;
        }

        Command::Migrate { .. } => {}
    }

    Ok(())
}

/// Compare the stored schema with --schema. A dry run only reports; otherwise
/// reopening with the new schema applies safe changes.
fn migrate(cli: &Cli, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let schema_path = cli
        .schema
        .as_ref()
        .ok_or("migrate needs --schema <schema.yaml>")?;
    let target = burrow::parse_schema(schema_path)?;

    let changes = {
        let mut current = base_config(cli)?;
        current.schema_path = None;
        let db = Database::open(current)?;
        db.pending_migrations(&target)?
    };
    let report: Vec<_> = changes
        .iter()
        .map(|m| serde_json::json!({ "change": m.describe(), "safe": m.is_safe() }))
        .collect();

    if dry_run {
        return print_output(
            &serde_json::json!({ "dry_run": true, "changes": report }),
            &cli.format,
        );
    }

    let db = Database::open(base_config(cli)?.schema(target))?;
    print_output(
        &serde_json::json!({
            "ok": true,
            "applied": report,
            "version": db.version()?,
        }),
        &cli.format,
    )
}

fn print_output<T: Serialize + ?Sized>(
    value: &T,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

fn fields_to_value(fields: &[(String, String)]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (key, val) in fields {
        // Numbers, booleans and lists parse as JSON; anything else is a string
        let json_val = serde_json::from_str(val).unwrap_or(serde_json::Value::String(val.clone()));
        map.insert(key.clone(), json_val);
    }
    serde_json::Value::Object(map)
}
