//! `acstools derive`

use std::path::{Path, PathBuf};

use acstools_rules::{derive_columns, RuleLedger};

use crate::exit_codes::EXIT_RULES_FAILED;
use crate::{read_table, show_progress, write_table, CliError};

pub(crate) fn cmd_derive(
    input: PathBuf,
    rules: PathBuf,
    out: Option<PathBuf>,
    ledger_path: Option<PathBuf>,
    strict: bool,
    quiet: bool,
) -> Result<(), CliError> {
    let rule_lines = read_rules(&rules)?;
    let table = read_table(&input)?;

    let (table, ledger) = derive_columns(table, &rule_lines);
    let out_label = write_table(&table, &out)?;

    if let Some(path) = &ledger_path {
        write_ledger(&ledger, path)?;
    }

    if show_progress(quiet) {
        eprintln!(
            "{} of {} rule(s) passed -> {}",
            ledger.len() - ledger.failed_count(),
            ledger.len(),
            out_label,
        );
    }

    if strict && ledger.failed_count() > 0 {
        let first = ledger
            .outcomes()
            .iter()
            .find(|o| o.detail.is_some())
            .map(|o| format!("'{}': {}", o.rule, o.detail.as_deref().unwrap_or_default()))
            .unwrap_or_default();
        return Err(CliError {
            code: EXIT_RULES_FAILED,
            message: format!("{} rule(s) failed; first {}", ledger.failed_count(), first),
            hint: Some("write the full list with --ledger FILE".to_string()),
        });
    }

    Ok(())
}

fn read_rules(path: &Path) -> Result<Vec<String>, CliError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("cannot read rules {}: {}", path.display(), e)))?;
    Ok(content.lines().map(str::to_string).collect())
}

/// JSON when the file name ends in `.json`, CSV otherwise.
fn write_ledger(ledger: &RuleLedger, path: &Path) -> Result<(), CliError> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        let text = serde_json::to_string_pretty(ledger)
            .map_err(|e| CliError::general(format!("JSON encode error: {}", e)))?;
        std::fs::write(path, text + "\n")
            .map_err(|e| CliError::io(format!("cannot write {}: {}", path.display(), e)))
    } else {
        write_table(&ledger.to_table(), &Some(path.to_path_buf())).map(|_| ())
    }
}
