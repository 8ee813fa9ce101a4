//! replaymobile_vp - inspect the Replay-Mobile verification protocols
//!
//! Lists protocols, groups and clients, and dumps the sampled frames a query
//! would return. Settings come from `REPLAYMOBILE_CONFIG` and the
//! `REPLAYMOBILE_*` environment variables.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::PathBuf;

use replaymobile_verification::{
    ObjectsQuery, SqliteDataset, VerificationConfig, VerificationDatabase,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the SQLite dataset (overrides configuration).
    #[arg(long, env = "REPLAYMOBILE_DB_PATH")]
    db_path: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Default)]
struct QueryArgs {
    /// High-level protocol, e.g. grandtest-licit
    #[arg(long)]
    protocol: Option<String>,
    /// Groups to include (world, dev, eval)
    #[arg(long = "group")]
    groups: Vec<String>,
    /// Purposes to include (enroll, probe)
    #[arg(long = "purpose")]
    purposes: Vec<String>,
    /// Restrict to these client ids
    #[arg(long = "client")]
    clients: Vec<String>,
}

impl QueryArgs {
    fn to_query(&self) -> ObjectsQuery {
        ObjectsQuery {
            groups: non_empty(&self.groups),
            protocol: self.protocol.clone(),
            purposes: non_empty(&self.purposes),
            model_ids: non_empty(&self.clients),
            ..ObjectsQuery::default()
        }
    }
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.to_vec())
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List high-level protocol names
    Protocols,
    /// List high-level group names
    Groups,
    /// List every client id
    Clients,
    /// List enrolled model ids for a protocol
    Models {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Print the path of every sampled frame matching the query
    Dumplist {
        #[command(flatten)]
        query: QueryArgs,
        /// Directory prepended to each path
        #[arg(long)]
        directory: Option<PathBuf>,
        /// Extension appended to each path
        #[arg(long)]
        extension: Option<String>,
    },
    /// Report source videos missing from the original directory
    Checkfiles {
        #[command(flatten)]
        query: QueryArgs,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut cfg = VerificationConfig::load()?;
    if let Some(db_path) = args.db_path {
        cfg.db_path = db_path;
    }
    let dataset = SqliteDataset::open(&cfg.db_path)?;
    let db = VerificationDatabase::new(dataset, cfg)?;

    match args.command {
        Command::Protocols => print_lines(db.protocol_names()?),
        Command::Groups => print_lines(db.groups()?),
        Command::Clients => print_lines(db.clients()?),
        Command::Models { query } => print_lines(db.model_ids_with_protocol(&query.to_query())?),
        Command::Dumplist {
            query,
            directory,
            extension,
        } => {
            for frame in db.objects(&query.to_query())? {
                println!(
                    "{}",
                    frame
                        .make_path(directory.as_deref(), extension.as_deref())
                        .display()
                );
            }
            Ok(())
        }
        Command::Checkfiles { query } => cmd_checkfiles(&db, &query),
    }
}

fn print_lines(lines: Vec<String>) -> Result<()> {
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

fn cmd_checkfiles(db: &VerificationDatabase<SqliteDataset>, query: &QueryArgs) -> Result<()> {
    if db.storage().original_directory.is_none() {
        return Err(anyhow!(
            "REPLAYMOBILE_ORIGINAL_DIRECTORY must be set to check files"
        ));
    }
    let frames = db.objects(&query.to_query())?;
    let videos: BTreeSet<PathBuf> = db.original_file_paths(&frames).into_iter().collect();
    let missing: Vec<&PathBuf> = videos.iter().filter(|p| !p.exists()).collect();
    for path in &missing {
        println!("missing: {}", path.display());
    }
    eprintln!("{} of {} videos found", videos.len() - missing.len(), videos.len());
    if missing.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("{} videos are missing", missing.len()))
    }
}
