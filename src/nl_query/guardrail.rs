//! SQL Guardrail
//!
//! Sits between the generation service and the task store. A candidate
//! statement only reaches the executor once it is a single read query,
//! carries none of the mutating keywords and points at the `tasks` table.

use std::collections::HashSet;
use std::ops::ControlFlow;

use sqlparser::ast::{ObjectName, Query, SetExpr, Statement, Visit, Visitor};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;
use tracing::{debug, warn};

use super::prompt::TASKS_TABLE;

/// Keywords rejected anywhere in a statement, matched as plain substrings.
pub const FORBIDDEN_KEYWORDS: [&str; 7] = [
    "insert", "update", "delete", "drop", "alter", "create", "truncate",
];

/// Why a candidate statement was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardrailViolation {
    #[error("Generated SQL must be a SELECT statement.")]
    NotASelect,

    #[error("Query contains forbidden keyword '{0}'.")]
    ForbiddenKeyword(&'static str),

    #[error("Query must target the tasks table.")]
    WrongTable,

    #[error("Query shape is not allowed: {0}")]
    UnsupportedShape(String),
}

impl GuardrailViolation {
    /// Stable machine-readable code for API callers.
    pub fn reason(&self) -> &'static str {
        match self {
            GuardrailViolation::NotASelect => "not_a_select",
            GuardrailViolation::ForbiddenKeyword(_) => "forbidden_keyword",
            GuardrailViolation::WrongTable => "wrong_table",
            GuardrailViolation::UnsupportedShape(_) => "unsupported_shape",
        }
    }
}

/// Read-only, single-table policy for generated SQL.
///
/// The default checks are substring based. `strict` adds a parsed
/// statement-shape check on top of them, closing the `tasks_archive` style
/// false acceptances the substring table check lets through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqlGuardrail {
    strict_shape: bool,
}

impl SqlGuardrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self { strict_shape: true }
    }

    pub fn with_strict_shape(strict_shape: bool) -> Self {
        Self { strict_shape }
    }

    pub fn is_strict(&self) -> bool {
        self.strict_shape
    }

    /// Validate a candidate statement, returning its normalized form.
    ///
    /// Checks run in a fixed order (select, deny-list, table scope, shape);
    /// the first failing check decides the reason.
    pub fn validate(&self, candidate: &str) -> Result<String, GuardrailViolation> {
        let stmt = normalize(candidate);
        let lowered = stmt.to_lowercase();

        if !lowered.starts_with("select") {
            warn!(reason = "not_a_select", "Rejected generated SQL");
            return Err(GuardrailViolation::NotASelect);
        }

        if let Some(keyword) = FORBIDDEN_KEYWORDS.iter().copied().find(|kw| lowered.contains(kw)) {
            warn!(reason = "forbidden_keyword", keyword, "Rejected generated SQL");
            return Err(GuardrailViolation::ForbiddenKeyword(keyword));
        }

        if !lowered.contains(&format!(" {}", TASKS_TABLE)) {
            warn!(reason = "wrong_table", "Rejected generated SQL");
            return Err(GuardrailViolation::WrongTable);
        }

        if self.strict_shape {
            check_statement_shape(stmt).inspect_err(|violation| {
                warn!(reason = "unsupported_shape", detail = %violation, "Rejected generated SQL");
            })?;
        }

        debug!(sql = stmt, "Generated SQL passed guardrail");
        Ok(stmt.to_string())
    }
}

/// Trim surrounding whitespace and any trailing statement terminators.
///
/// All trailing terminators go, not just one, so that a normalized statement
/// normalizes to itself.
pub fn normalize(candidate: &str) -> &str {
    candidate
        .trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

/// Parse the statement and require exactly one query whose every relation is
/// the tasks table (or a CTE defined inside the same query).
fn check_statement_shape(sql: &str) -> Result<(), GuardrailViolation> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| GuardrailViolation::UnsupportedShape(format!("unparseable statement ({e})")))?;

    let statement = match statements.as_slice() {
        [single] => single,
        other => {
            return Err(GuardrailViolation::UnsupportedShape(format!(
                "expected exactly one statement, found {}",
                other.len()
            )))
        }
    };

    if !matches!(statement, Statement::Query(_)) {
        return Err(GuardrailViolation::UnsupportedShape(
            "statement is not a query".to_string(),
        ));
    }

    let mut scope = RelationScope::default();
    if let ControlFlow::Break(violation) = statement.visit(&mut scope) {
        return Err(violation);
    }

    Ok(())
}

/// Resolves each relation against the CTEs of the queries enclosing it.
#[derive(Default)]
struct RelationScope {
    cte_scopes: Vec<HashSet<String>>,
}

impl Visitor for RelationScope {
    type Break = GuardrailViolation;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if selects_into(&query.body) {
            return ControlFlow::Break(GuardrailViolation::UnsupportedShape(
                "SELECT INTO creates a table".to_string(),
            ));
        }
        let names = query
            .with
            .iter()
            .flat_map(|with| &with.cte_tables)
            .map(|cte| cte.alias.name.value.to_lowercase())
            .collect();
        self.cte_scopes.push(names);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.cte_scopes.pop();
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        if is_tasks_table(relation) || is_cte_reference(relation, &self.cte_scopes) {
            return ControlFlow::Continue(());
        }
        ControlFlow::Break(GuardrailViolation::UnsupportedShape(format!(
            "references table {relation} outside the tasks table"
        )))
    }
}

fn selects_into(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::SetOperation { left, right, .. } => selects_into(left) || selects_into(right),
        _ => false,
    }
}

fn is_tasks_table(relation: &ObjectName) -> bool {
    let idents = &relation.0;
    let matches = |ident: &sqlparser::ast::Ident, expected: &str| match ident.quote_style {
        Some(_) => ident.value == expected,
        None => ident.value.eq_ignore_ascii_case(expected),
    };
    match idents.as_slice() {
        [table] => matches(table, TASKS_TABLE),
        [schema, table] => matches(schema, "public") && matches(table, TASKS_TABLE),
        _ => false,
    }
}

/// A bare name matching a CTE of the current query or any query around it.
fn is_cte_reference(relation: &ObjectName, cte_scopes: &[HashSet<String>]) -> bool {
    match relation.0.as_slice() {
        [name] => {
            let name = name.value.to_lowercase();
            cte_scopes.iter().any(|scope| scope.contains(&name))
        }
        _ => false,
    }
}
