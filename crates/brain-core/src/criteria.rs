//! Outcome-criteria expressions (§4.6 step 5): small boolean predicates
//! over a call's status code and response body, e.g.
//! `status_code == 200 AND body contains "payment_id"`. `AND` binds
//! every top-level clause; `OR` binds within a clause. No parentheses,
//! matching the flat predicates the registry's action definitions use.

use serde_json::Value;

pub struct CallOutcome<'a> {
    pub status_code: u16,
    pub body: &'a Value,
}

/// Evaluates `expr` against `outcome`. An expression that fails to
/// parse (unknown clause shape) evaluates to `false` rather than
/// erroring, so a malformed `success_criteria` fails closed.
pub fn evaluate(expr: &str, outcome: &CallOutcome) -> bool {
    expr.split(" AND ").all(|clause| evaluate_or(clause.trim(), outcome))
}

fn evaluate_or(expr: &str, outcome: &CallOutcome) -> bool {
    expr.split(" OR ").any(|clause| evaluate_term(clause.trim(), outcome))
}

fn evaluate_term(term: &str, outcome: &CallOutcome) -> bool {
    if let Some(rest) = term.strip_prefix("status_code ==") {
        return rest.trim().parse::<u16>().map(|n| n == outcome.status_code).unwrap_or(false);
    }
    if let Some(rest) = term.strip_prefix("status_code !=") {
        return rest.trim().parse::<u16>().map(|n| n != outcome.status_code).unwrap_or(false);
    }
    if let Some(rest) = term.strip_prefix("body contains") {
        let needle = rest.trim().trim_matches('"');
        return outcome.body.to_string().contains(needle);
    }
    if let Some(rest) = term.strip_prefix("body not contains") {
        let needle = rest.trim().trim_matches('"');
        return !outcome.body.to_string().contains(needle);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_body_clause_both_must_hold() {
        let body = serde_json::json!({ "payment_id": "pay_123" });
        let outcome = CallOutcome { status_code: 200, body: &body };
        assert!(evaluate(r#"status_code == 200 AND body contains "payment_id""#, &outcome));
    }

    #[test]
    fn missing_expected_field_fails_the_criteria() {
        let body = serde_json::json!({ "status": "accepted" });
        let outcome = CallOutcome { status_code: 200, body: &body };
        assert!(!evaluate(r#"status_code == 200 AND body contains "payment_id""#, &outcome));
    }

    #[test]
    fn unparseable_clause_fails_closed() {
        let body = serde_json::json!({});
        let outcome = CallOutcome { status_code: 200, body: &body };
        assert!(!evaluate("something_unrecognized", &outcome));
    }
}
