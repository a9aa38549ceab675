// acstools CLI - Census geocoding, ACS5 statistics, TIGER/Line shapes, row rules

mod census;
mod derive;
mod exit_codes;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use acstools_config::Settings;
use acstools_table::{Table, TableError};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::{EXIT_ERROR, EXIT_IO, EXIT_PARSE, EXIT_SUCCESS, EXIT_USAGE};

/// Environment variable controlling log verbosity (tracing `EnvFilter` syntax).
const LOG_ENV: &str = "ACSTOOLS_LOG";

#[derive(Parser)]
#[command(name = "acstools")]
#[command(about = "Census Bureau data helpers: geocode addresses, fetch ACS5 statistics, assemble TIGER/Line shapes, derive columns")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Settings file (default: ~/.config/acstools/settings.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Suppress progress and informational logs on stderr
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Geocode addresses (ID, street, zipcode) to a geography's GEOID
    #[command(after_help = "\
Output columns: ID, status, result. Rows that fail keep their ID and get a
status explaining why; the command still exits 0.

Examples:
  acstools geocode addresses.csv --geography \"Census Tracts\"
  acstools geocode addresses.csv -g \"Census Blocks\" --vintage Census2020_Current --out blocks.csv
  cat addresses.csv | acstools geocode - -g Counties")]
    Geocode {
        /// Input CSV with ID, street, zipcode columns (- for stdin)
        input: PathBuf,

        /// Geography level name (see `acstools geographies`)
        #[arg(long, short = 'g')]
        geography: String,

        /// Address snapshot to match against (default from settings)
        #[arg(long)]
        benchmark: Option<String>,

        /// Geography edition to link to (default from settings)
        #[arg(long)]
        vintage: Option<String>,

        /// Output CSV file path (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Append ACS 5-year variables to block groups (ID, GEOID)
    #[command(after_help = "\
Variables are requested in chunks of 49. Output columns: ID, status, GEOID,
then each variable in the order given.

Examples:
  acstools acs5 bgs.csv --var B01001_001E --var B19013_001E
  acstools acs5 bgs.csv --vars-file vars.txt --year 2021 --out acs.csv
  CENSUS_API_KEY=... acstools acs5 bgs.csv --var B01001_001E")]
    Acs5 {
        /// Input CSV with ID and 12-digit GEOID columns (- for stdin)
        input: PathBuf,

        /// Variable name, e.g. B01001_001E. Repeatable; comma-separated accepted.
        #[arg(long = "var", value_name = "NAME")]
        vars: Vec<String>,

        /// File with one variable name per line (# comments allowed)
        #[arg(long, value_name = "FILE")]
        vars_file: Option<PathBuf>,

        /// ACS 5-year publication year (default from settings)
        #[arg(long)]
        year: Option<u16>,

        /// Census API key (default: CENSUS_API_KEY env, then keychain)
        #[arg(long)]
        api_key: Option<String>,

        /// Output CSV file path (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Download and combine TIGER/Line shape files for one geography
    #[command(after_help = "\
Geometry is written as WKT in a `geometry` column. Any file that fails to
download or decode aborts the whole command.

Examples:
  acstools shapes TRACT 2020 --out tracts.csv
  acstools shapes BG 2019")]
    Shapes {
        /// Geography code (STATE, COUNTY, TRACT, BG, ...)
        abbrev: String,

        /// TIGER/Line year, 2001-2999
        year: String,

        /// Output CSV file path (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Derive columns and check conditions with row rules
    #[command(after_help = "\
Rules file: one rule per line. `name = expr` derives a column, a bare
expression is a check that must hold on every row, `#` starts a comment.

Examples:
  acstools derive acs.csv --rules rules.txt --out derived.csv
  acstools derive acs.csv --rules rules.txt --ledger ledger.csv --strict")]
    Derive {
        /// Input CSV (- for stdin)
        input: PathBuf,

        /// Rules file
        #[arg(long)]
        rules: PathBuf,

        /// Output CSV file path (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Write the pass/fail ledger (CSV, or JSON if the name ends in .json)
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Exit 60 if any rule failed
        #[arg(long)]
        strict: bool,
    },

    /// List supported geography names and codes
    Geographies {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\ntarget:  ", env!("TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let quiet = cli.quiet;
    let config = cli.config;

    match cli.command {
        Commands::Geocode { input, geography, benchmark, vintage, out } => {
            let settings = load_settings(config.as_deref())?;
            census::cmd_geocode(&settings, input, geography, benchmark, vintage, out, quiet)
        }
        Commands::Acs5 { input, vars, vars_file, year, api_key, out } => {
            let settings = load_settings(config.as_deref())?;
            census::cmd_acs5(&settings, input, vars, vars_file, year, api_key, out, quiet)
        }
        Commands::Shapes { abbrev, year, out } => {
            let settings = load_settings(config.as_deref())?;
            census::cmd_shapes(&settings, abbrev, year, out, quiet)
        }
        Commands::Derive { input, rules, out, ledger, strict } => {
            derive::cmd_derive(input, rules, out, ledger, strict, quiet)
        }
        Commands::Geographies { json } => census::cmd_geographies(json),
    }
}

/// Logs go to stderr. `ACSTOOLS_LOG` overrides the default level
/// (`info`, or `warn` with `--quiet`).
fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

fn load_settings(path: Option<&Path>) -> Result<Settings, CliError> {
    match path {
        Some(path) => Settings::load_from(path).map_err(|e| match e {
            acstools_config::ConfigError::Io(msg) => CliError::io(msg),
            acstools_config::ConfigError::Parse(msg) => CliError::parse(msg)
                .with_hint("settings are JSON; lines starting with // are comments"),
        }),
        None => Ok(Settings::load()),
    }
}

// ============================================================================
// Shared I/O helpers
// ============================================================================

/// Read a CSV table from a path, or stdin for `-`.
pub(crate) fn read_table(path: &Path) -> Result<Table, CliError> {
    let result = if path.as_os_str() == "-" {
        acstools_table::csv::import_from_reader(io::stdin().lock())
    } else {
        if !path.exists() {
            return Err(CliError::io(format!("file not found: {}", path.display())));
        }
        acstools_table::csv::import(path)
    };
    result.map_err(CliError::from)
}

/// Write a table as CSV (file or stdout). Returns the output label.
pub(crate) fn write_table(table: &Table, out: &Option<PathBuf>) -> Result<String, CliError> {
    acstools_table::csv::export(table, out).map_err(CliError::from)
}

/// Progress notes only when stderr is a terminal and not `--quiet`.
pub(crate) fn show_progress(quiet: bool) -> bool {
    !quiet && atty::is(atty::Stream::Stderr)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self { code: EXIT_PARSE, message: msg.into(), hint: None }
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<TableError> for CliError {
    fn from(err: TableError) -> Self {
        match err {
            TableError::Io(_) => CliError::io(err.to_string()),
            TableError::Parse(_) | TableError::DuplicateColumn(_) => CliError::parse(err.to_string()),
        }
    }
}
