use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;

use lexicon_backend::app_settings::LexiconSettings;
use lexicon_backend::db::{DatabaseHandle, MemoryRepository};
use lexicon_backend::get_create_lexicon_dir;
use lexicon_backend::lexicon_sort::{LexEntrySortHelper, SortField, SortedIndex};
use lexicon_backend::lift_import::{read_lift_records, spawn_import, ImportProgress, ImportSummary};
use lexicon_backend::logger::{self, format_duration, init_logger};
use lexicon_backend::models_lexicon::LexEntry;

type LexiconHandle = DatabaseHandle<MemoryRepository<LexEntry>>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Lexicon CLI", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Optional path to the lexicon data directory, where log.txt is written.
    /// If not provided, the LEXICON_DIR environment variable will be used.
    #[arg(long, global = true, value_name = "DIRECTORY_PATH", env = "LEXICON_DIR")]
    lexicon_dir: Option<PathBuf>,

    /// Settings file (JSON). Defaults are used if it doesn't exist.
    #[arg(long, global = true, value_name = "FILE_PATH")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import parsed LIFT records and report the counts
    #[command(arg_required_else_help = true)]
    Import {
        /// Path to the records (JSON array)
        #[arg(value_name = "FILE_PATH")]
        path: PathBuf,
    },

    /// Import parsed LIFT records and print the alphabetized index
    #[command(arg_required_else_help = true)]
    Browse {
        /// Path to the records (JSON array)
        #[arg(value_name = "FILE_PATH")]
        path: PathBuf,

        /// Writing system to sort by, instead of the one in the settings
        #[arg(long)]
        ws: Option<String>,

        /// Field to sort by, instead of the one in the settings
        #[arg(long, value_enum)]
        field: Option<FieldArg>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FieldArg {
    Gloss,
    LexicalForm,
}

impl From<FieldArg> for SortField {
    fn from(f: FieldArg) -> Self {
        match f {
            FieldArg::Gloss => SortField::Gloss,
            FieldArg::LexicalForm => SortField::LexicalForm,
        }
    }
}

fn import_into_memory(path: &Path, settings: &LexiconSettings) -> Result<(Arc<LexiconHandle>, ImportSummary)> {
    if !path.is_file() {
        anyhow::bail!("Records file does not exist: {:?}", path);
    }
    let records = read_lift_records(path)?;

    let handle = Arc::new(DatabaseHandle::new(MemoryRepository::<LexEntry>::new()));
    let progress = Arc::new(ImportProgress::new());
    let worker = spawn_import(handle.clone(), records, settings.clone(), progress.clone());

    let summary = worker
        .join()
        .map_err(|_| anyhow::anyhow!("Import worker panicked"))??;

    logger::info(&format!(
        "Imported {} of {} records from {:?} in {}",
        summary.entries_committed,
        summary.entries_read,
        path,
        format_duration(summary.elapsed)
    ));
    if summary.fields_skipped > 0 {
        logger::warn(&format!("Skipped {} malformed fields, see the log for details", summary.fields_skipped));
    }
    Ok((handle, summary))
}

fn import_records(path: &Path, settings: &LexiconSettings) -> Result<()> {
    let (_handle, summary) = import_into_memory(path, settings)?;
    println!("read: {}", summary.entries_read);
    println!("committed: {}", summary.entries_committed);
    println!("deleted: {}", summary.entries_deleted);
    println!("skipped fields: {}", summary.fields_skipped);
    Ok(())
}

fn browse_records(path: &Path, settings: &LexiconSettings, ws: Option<String>, field: Option<FieldArg>) -> Result<()> {
    let (handle, _summary) = import_into_memory(path, settings)?;

    let ws = ws.unwrap_or_else(|| settings.sort_writing_system.clone());
    let field = field.map(SortField::from).unwrap_or(settings.sort_field);
    let helper = LexEntrySortHelper::new(&ws, field)
        .with_context(|| format!("Can't sort by writing system '{}'", ws))?;

    let index = handle.do_read(|repo| Ok(SortedIndex::build(repo, &helper)))??;

    for (key, id) in index.pairs() {
        println!("{}\t{}", key, id);
    }
    Ok(())
}

fn main() {
    if dotenv().is_err() {
        println!("Info: No .env file found or failed to load.");
    }

    let cli = Cli::parse();

    // Precedence:
    // - given with --lexicon-dir
    // - set with env var LEXICON_DIR
    // - get_create_lexicon_dir()
    let lexicon_dir = match cli.lexicon_dir {
        Some(path) => path,
        None => match get_create_lexicon_dir() {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Failed to get lexicon directory: {}", e);
                eprintln!("Use the --lexicon-dir option or set the LEXICON_DIR environment variable.");
                exit(1);
            }
        },
    };

    if let Err(e) = init_logger(&lexicon_dir) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let settings = match LexiconSettings::load_or_default(cli.settings.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {:#}", e);
            exit(1);
        }
    };

    // === Execute the requested command ===
    let command_result = match cli.command {
        Commands::Import { path } => import_records(&path, &settings),
        Commands::Browse { path, ws, field } => browse_records(&path, &settings, ws, field),
    };

    if let Err(e) = command_result {
        logger::error(&format!("{:#}", e));
        eprintln!("Error executing command: {:#}", e);
        exit(1);
    }
}
