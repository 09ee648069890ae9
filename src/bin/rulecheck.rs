//! stablebridge rule checker
//!
//! Validates a rule file, prints the supertable DDL it implies and optionally
//! maps a sample payload to the INSERT statement it would produce.

use stablebridge::rule::RuleSet;
use stablebridge::telemetry::Telemetry;
use stablebridge::Error;

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Validate stablebridge rule files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Rule file (JSON array of rules)
    #[arg(long, env = "STABLEBRIDGE_RULES")]
    rules: PathBuf,

    /// Qualify supertable names with this database
    #[arg(long, env = "STABLEBRIDGE_DATABASE")]
    database: Option<String>,

    /// Topic of the sample payload
    #[arg(long, requires = "payload")]
    topic: Option<String>,

    /// Sample JSON payload to map
    #[arg(long, requires = "topic")]
    payload: Option<String>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn qualify(database: Option<&str>, name: &str) -> String {
    match database {
        Some(db) => format!("{}.{}", db, name),
        None => name.to_string(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let _telemetry = Telemetry::init_for_component("stablebridge-rulecheck", &args.log_level)?;

    let rules = RuleSet::load(&args.rules)?;
    info!(rules = rules.len(), path = %args.rules.display(), "Rule file is valid");

    for topic in rules.topics() {
        let Some(rule) = rules.get(topic) else {
            continue;
        };
        let sql = stablebridge::sql::create_stable(
            &qualify(args.database.as_deref(), &rule.stable),
            &rule.column_infos(),
            &rule.tag_infos(),
        );
        println!("-- topic {}", topic);
        println!("{};", sql);
    }

    if let (Some(topic), Some(payload)) = (args.topic.as_deref(), args.payload.as_deref()) {
        match rules.parse(topic, payload.as_bytes())? {
            Some(mut row) => {
                row.table = qualify(args.database.as_deref(), &row.table);
                row.stable = qualify(args.database.as_deref(), &row.stable);
                println!("{};", row.to_insert_sql());
            }
            None => {
                return Err(Box::new(Error::Config(format!(
                    "no rule registered for topic '{}'",
                    topic
                ))));
            }
        }
    }

    Ok(())
}
