//! `acstools-rules` - apply derivation and check rules to a table.
//!
//! Rules are written in a small expression language over column names,
//! never executed as code:
//!
//! ```text
//! # comment lines are skipped
//! pct_under5 = ROUND(B01001_003E / B01001_001E * 100, 1)
//! [Total Pop] = B01001_001E
//! B01001_001E >= 0
//! ```
//!
//! `target = expr` derives (or overwrites) a column; a bare expression is
//! a check that must hold on every row. Each rule is all-or-nothing: a rule
//! that fails on any row leaves the table untouched and is recorded as
//! `failed` in the ledger.

pub mod eval;
pub mod ledger;
pub mod parser;

use acstools_table::{Table, Value};

pub use ledger::{RuleLedger, RuleOutcome, RuleStatus};
pub use parser::{parse_rule, Expr, Op, Rule, MAX_DEPTH};

/// Apply `rules` in order, returning the updated table and the ledger.
pub fn derive_columns<S: AsRef<str>>(mut table: Table, rules: &[S]) -> (Table, RuleLedger) {
    let mut ledger = RuleLedger::default();
    let active: Vec<&str> = rules
        .iter()
        .map(AsRef::as_ref)
        .filter(|r| !parser::is_comment_or_blank(r))
        .collect();

    tracing::info!(rules = active.len(), rows = table.len(), "applying rules");

    for (i, rule) in active.iter().enumerate() {
        let result = parse_rule(rule).and_then(|parsed| apply_rule(&mut table, &parsed));
        match &result {
            Ok(()) => tracing::debug!(rule = i + 1, "rule passed"),
            Err(e) => tracing::debug!(rule = i + 1, error = %e, "rule failed"),
        }
        ledger.record(rule.trim(), result);
    }

    if ledger.failed_count() > 0 {
        tracing::warn!(
            failed = ledger.failed_count(),
            total = ledger.len(),
            "some rules failed"
        );
    }

    (table, ledger)
}

/// Apply one parsed rule. On error the table is not modified.
pub fn apply_rule(table: &mut Table, rule: &Rule) -> Result<(), String> {
    match rule {
        Rule::Assign { target, expr } => {
            let mut values = Vec::with_capacity(table.len());
            for (i, row) in table.rows().enumerate() {
                let value = eval::evaluate(expr, &row).map_err(|e| format!("row {}: {}", i + 1, e))?;
                values.push(value);
            }
            table.set_column(target, values);
            Ok(())
        }
        Rule::Check(expr) => {
            for (i, row) in table.rows().enumerate() {
                let value = eval::evaluate(expr, &row).map_err(|e| format!("row {}: {}", i + 1, e))?;
                let holds = match value {
                    Value::Empty => false,
                    other => other.to_bool().map_err(|e| format!("row {}: {}", i + 1, e))?,
                };
                if !holds {
                    return Err(format!("check is FALSE on row {}", i + 1));
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn acs_table() -> Table {
        let mut t = Table::new(["ID", "B01001_001E", "B01001_003E"]);
        t.push_row(vec!["1".into(), "1000".into(), "50".into()]);
        t.push_row(vec!["2".into(), "0".into(), "0".into()]);
        t.push_row(vec!["3".into(), Value::Empty, "10".into()]);
        t
    }

    #[test]
    fn test_comment_and_failing_rule() {
        let rules = ["# derived fields", "no_such_column * 2 > 1"];
        let (_, ledger) = derive_columns(acs_table(), &rules);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.outcomes()[0].status, RuleStatus::Failed);
        assert_eq!(ledger.outcomes()[0].rule, "no_such_column * 2 > 1");
    }

    #[test]
    fn test_assignment_creates_column() {
        let rules = ["pct = B01001_003E / B01001_001E * 100"];
        let (t, ledger) = derive_columns(acs_table(), &rules);
        assert_eq!(ledger.status_of(rules[0]), Some(RuleStatus::Passed));
        assert_eq!(t.get(0, "pct"), Some(&Value::Number(5.0)));
        // division by zero and missing population are missing values
        assert_eq!(t.get(1, "pct"), Some(&Value::Empty));
        assert_eq!(t.get(2, "pct"), Some(&Value::Empty));
    }

    #[test]
    fn test_later_rules_see_earlier_columns() {
        let rules = ["double = B01001_003E * 2", "quad = double * 2"];
        let (t, ledger) = derive_columns(acs_table(), &rules);
        assert_eq!(ledger.failed_count(), 0);
        assert_eq!(t.get(0, "quad"), Some(&Value::Number(200.0)));
    }

    #[test]
    fn test_failing_assignment_leaves_table_unchanged() {
        let mut t = acs_table();
        t.push_row(vec!["4".into(), "abc".into(), "1".into()]);
        let before = t.clone();
        let (after, ledger) = derive_columns(t, &["ratio = B01001_003E / B01001_001E"]);
        assert_eq!(ledger.failed_count(), 1);
        assert!(ledger.outcomes()[0].detail.as_deref().unwrap().contains("row 4"));
        assert_eq!(after, before);
    }

    #[test]
    fn test_checks() {
        let rules = ["B01001_003E >= 0", "B01001_001E > 0"];
        let (_, ledger) = derive_columns(acs_table(), &rules);
        assert_eq!(ledger.status_of("B01001_003E >= 0"), Some(RuleStatus::Passed));
        // row 2 has zero population
        assert_eq!(ledger.status_of("B01001_001E > 0"), Some(RuleStatus::Failed));
    }

    #[test]
    fn test_parse_error_is_failed_not_panic() {
        let (_, ledger) = derive_columns(acs_table(), &["x = (1 +"]);
        assert_eq!(ledger.outcomes()[0].status, RuleStatus::Failed);
    }

    #[test]
    fn test_ledger_table() {
        let (_, ledger) = derive_columns(acs_table(), &["a = 1", "  ", "b ="]);
        let t = ledger.to_table();
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(0, "status"), Some(&Value::text("passed")));
        assert_eq!(t.get(1, "status"), Some(&Value::text("failed")));
        assert_eq!(t.get(0, "detail"), Some(&Value::Empty));
    }

    #[test]
    fn test_runaway_rules_fail_without_crashing() {
        let deep = format!("x = {}1{}", "(".repeat(2_000), ")".repeat(2_000));
        let chain = format!("y = {}", vec!["B01001_001E"; 200_000].join(" + "));
        let rules = [deep.as_str(), chain.as_str(), "z = B01001_003E + 1"];

        let (t, ledger) = derive_columns(acs_table(), &rules);
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.failed_count(), 2);
        assert!(ledger.outcomes()[0].detail.as_deref().unwrap().contains("nested too deeply"));
        assert!(ledger.outcomes()[1].detail.as_deref().unwrap().contains("nested too deeply"));
        assert_eq!(t.get(0, "z"), Some(&Value::Number(51.0)));
        assert!(!t.has_column("x"));
    }

    proptest! {
        #[test]
        fn prop_comments_never_recorded(n in 0usize..20) {
            let rules: Vec<String> = (0..n).map(|i| format!("# rule {}", i)).collect();
            let (t, ledger) = derive_columns(acs_table(), &rules);
            prop_assert!(ledger.is_empty());
            prop_assert_eq!(t, acs_table());
        }
    }
}
