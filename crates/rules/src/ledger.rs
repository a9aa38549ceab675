use serde::Serialize;

use acstools_table::{Table, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Passed,
    Failed,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Passed => "passed",
            RuleStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleOutcome {
    pub rule: String,
    pub status: RuleStatus,
    /// Why the rule failed; `None` when it passed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Pass/fail record of every non-comment rule, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RuleLedger {
    outcomes: Vec<RuleOutcome>,
}

impl RuleLedger {
    pub(crate) fn record(&mut self, rule: &str, result: Result<(), String>) {
        let (status, detail) = match result {
            Ok(()) => (RuleStatus::Passed, None),
            Err(e) => (RuleStatus::Failed, Some(e)),
        };
        self.outcomes.push(RuleOutcome {
            rule: rule.to_string(),
            status,
            detail,
        });
    }

    pub fn outcomes(&self) -> &[RuleOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == RuleStatus::Failed)
            .count()
    }

    /// Status of the first rule with exactly this text.
    pub fn status_of(&self, rule: &str) -> Option<RuleStatus> {
        self.outcomes.iter().find(|o| o.rule == rule).map(|o| o.status)
    }

    /// Ledger as a `rule,status,detail` table for CSV output.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(["rule", "status", "detail"]);
        for outcome in &self.outcomes {
            table.push_row(vec![
                Value::text(outcome.rule.as_str()),
                Value::text(outcome.status.as_str()),
                outcome.detail.clone().map(Value::Text).unwrap_or_default(),
            ]);
        }
        table
    }
}
