//! Command-line inspector for entities databases.
//!
//! # Responsibility
//! - Open an entities database and print lists, counts, entities and hashes.
//! - Keep output line-oriented so it can be piped into other tools.
//!
//! Usage:
//!   entities-cli --db entities.sqlite3 lists
//!   entities-cli --db entities.sqlite3 query cases --eq region=north

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use entities_core::db::open_existing_db;
use entities_core::{
    init_logging_from_config, EntitiesRepository, EntityQuery, SqliteEntitiesRepository,
    StoreConfig,
};
use log::info;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "entities-cli")]
#[command(about = "Inspect entity lists stored in an entities database", version)]
struct Args {
    /// Database file; overrides the config file and ENTITIES_DB_PATH
    #[arg(long)]
    db: Option<PathBuf>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every registered list name
    Lists,
    /// Print the number of entities in a list
    Count { list: String },
    /// Print matching entities as JSON lines
    Query {
        list: String,
        /// `column=value` filter; repeated filters are combined with AND
        #[arg(long = "eq", value_name = "COLUMN=VALUE")]
        filters: Vec<String>,
    },
    /// Print the entity at a zero-based index
    Get { list: String, index: usize },
    /// Print the stored list hash
    Hash { list: String },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging_from_config(&config).context("failed to initialize logging")?;

    let Some(path) = &config.database_path else {
        bail!("no database given; pass --db or set ENTITIES_DB_PATH");
    };
    let conn = open_existing_db(path, config.busy_timeout())
        .with_context(|| format!("failed to open entities database `{}`", path.display()))?;
    let repo = SqliteEntitiesRepository::try_new(&conn)?;
    info!(
        "event=cli_command module=cli status=start command={}",
        describe(&args.command)
    );

    for line in run(&repo, &args.command)? {
        println!("{line}");
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<StoreConfig> {
    let config = match &args.config {
        Some(path) => StoreConfig::from_json_file(path)?,
        None => StoreConfig::default(),
    };
    let mut config = config.with_env_overrides()?;
    if let Some(db) = &args.db {
        config.database_path = Some(db.clone());
    }
    Ok(config)
}

fn run(repo: &impl EntitiesRepository, command: &Command) -> Result<Vec<String>> {
    let lines: Vec<String> = match command {
        Command::Lists => repo.get_lists()?.into_iter().collect(),
        Command::Count { list } => vec![repo.get_count(list)?.to_string()],
        Command::Query { list, filters } => {
            let query = parse_filters(filters)?;
            repo.query(list, query.as_ref())?
                .iter()
                .map(serde_json::to_string)
                .collect::<Result<_, _>>()?
        }
        Command::Get { list, index } => match repo.get_by_index(list, *index)? {
            Some(saved) => vec![serde_json::to_string(&saved)?],
            None => bail!("no entity at index {index} in list `{list}`"),
        },
        Command::Hash { list } => vec![repo.get_list_hash(list)?.unwrap_or_default()],
    };
    Ok(lines)
}

// Filter values are entity contents and stay out of the logs.
fn describe(command: &Command) -> String {
    match command {
        Command::Lists => "lists".to_string(),
        Command::Count { list } => format!("count list={list}"),
        Command::Query { list, filters } => {
            format!("query list={list} filters={}", filters.len())
        }
        Command::Get { list, index } => format!("get list={list} index={index}"),
        Command::Hash { list } => format!("hash list={list}"),
    }
}

fn parse_filters(filters: &[String]) -> Result<Option<EntityQuery>> {
    let mut combined: Option<EntityQuery> = None;
    for filter in filters {
        let (column, value) = filter
            .split_once('=')
            .ok_or_else(|| anyhow!("filter `{filter}` must look like column=value"))?;
        let next = EntityQuery::eq(column.trim(), value);
        combined = Some(match combined {
            Some(query) => query.and(next),
            None => next,
        });
    }
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::{describe, parse_filters, run, Command};
    use entities_core::db::{open_existing_db, DbError, DEFAULT_BUSY_TIMEOUT};
    use entities_core::{EntitiesRepository, Entity, EntityQuery, InMemoryEntitiesRepository};

    #[test]
    fn repeated_filters_are_combined_with_and() {
        let query = parse_filters(&["region=north".to_string(), "name=a".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(
            query,
            EntityQuery::eq("region", "north").and(EntityQuery::eq("name", "a"))
        );
        assert!(parse_filters(&["broken".to_string()]).is_err());
        assert!(parse_filters(&[]).unwrap().is_none());
    }

    #[test]
    fn commands_print_one_line_per_item() {
        let repo = InMemoryEntitiesRepository::new();
        repo.save(
            "cases",
            &[
                Entity::new("a", "A").with_property("region", "north"),
                Entity::new("b", "B").with_property("region", "south"),
            ],
        )
        .unwrap();
        repo.update_list_hash("cases", "h1").unwrap();

        assert_eq!(run(&repo, &Command::Lists).unwrap(), vec!["cases"]);
        assert_eq!(
            run(&repo, &Command::Count { list: "cases".into() }).unwrap(),
            vec!["2"]
        );
        assert_eq!(
            run(&repo, &Command::Hash { list: "cases".into() }).unwrap(),
            vec!["h1"]
        );

        let lines = run(
            &repo,
            &Command::Query {
                list: "cases".into(),
                filters: vec!["region=south".into()],
            },
        )
        .unwrap();
        assert_eq!(lines.len(), 1);
        let json: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(json["id"], "b");
        assert_eq!(json["index"], 1);

        assert!(run(
            &repo,
            &Command::Get {
                list: "cases".into(),
                index: 5
            }
        )
        .is_err());
    }

    #[test]
    fn command_description_omits_filter_values() {
        let command = Command::Query {
            list: "cases".into(),
            filters: vec!["patient=Jane Doe".into(), "region=north".into()],
        };

        let described = describe(&command);
        assert_eq!(described, "query list=cases filters=2");
        assert!(!described.contains("Jane"));
    }

    #[test]
    fn missing_database_file_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typo.sqlite3");

        let err = open_existing_db(&path, DEFAULT_BUSY_TIMEOUT).unwrap_err();

        assert!(matches!(err, DbError::MissingDatabase(ref missing) if *missing == path));
        assert!(!path.exists());
    }
}
