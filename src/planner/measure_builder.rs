//! Measure SQL builder (§4.8).
//!
//! Simple measures become `AGG(expr)`, with inline filters becoming
//! `AGG(CASE WHEN f THEN expr END)`. Calculated measures substitute
//! `{ref}` placeholders with the referent's already-built expression;
//! cycle/self-ref/unknown-ref detection happened at registration.

use std::collections::HashMap;

use crate::cache::FilterSqlCache;
use crate::error::PlanError;
use crate::model::types::AggregationType;
use crate::model::{MeasureDef, QueryContext};
use crate::query::Condition;
use crate::sql::{avg, count, count_distinct, max, min, sum, Expr};

/// Builds a simple measure's aggregate expression, wrapping the base
/// column in a `CASE WHEN` per inline filter condition.
pub fn build_simple(
    measure: &MeasureDef,
    ctx: &QueryContext,
    filter_cache: &FilterSqlCache,
    mut build_condition: impl FnMut(&Condition) -> Expr,
) -> Result<Expr, PlanError> {
    let MeasureDef::Simple { kind, sql, filters } = measure else {
        panic!("build_simple called on a non-simple measure");
    };

    let base = (sql)(ctx).into_expr();

    let filtered = if filters.is_empty() {
        base
    } else {
        let predicate = combine_filters(filters, filter_cache, &mut build_condition);
        apply_inline_filter(base, predicate)
    };

    Ok(aggregate(*kind, filtered))
}

fn combine_filters(
    filters: &[Condition],
    filter_cache: &FilterSqlCache,
    build_condition: &mut impl FnMut(&Condition) -> Expr,
) -> Expr {
    use crate::query::Filter;
    use crate::sql::ExprExt;

    let mut iter = filters.iter();
    let first = iter.next().expect("non-empty filters checked by caller");
    let mut combined = filter_cache.get_or_build(&Filter::Condition(first.clone()), || {
        build_condition(first)
    });
    for condition in iter {
        let next = filter_cache.get_or_build(&Filter::Condition(condition.clone()), || {
            build_condition(condition)
        });
        combined = combined.and(next);
    }
    combined
}

/// Wraps `base` in `CASE WHEN predicate THEN base END` - the portable
/// form of an inline measure filter. Dialects with native `FILTER`
/// support (`supports_aggregate_filter`) are a render-time concern for
/// the assembler, not this builder: the CASE form is valid everywhere.
fn apply_inline_filter(base: Expr, predicate: Expr) -> Expr {
    Expr::Case {
        operand: None,
        when_clauses: vec![(predicate, base)],
        else_clause: None,
    }
}

fn aggregate(kind: AggregationType, expr: Expr) -> Expr {
    match kind {
        AggregationType::Count => count(expr),
        AggregationType::CountDistinct | AggregationType::CountDistinctApprox => {
            count_distinct(expr)
        }
        AggregationType::Sum => sum(expr),
        AggregationType::Avg => avg(expr),
        AggregationType::Min => min(expr),
        AggregationType::Max => max(expr),
        AggregationType::Number => expr,
    }
}

/// Builds a calculated measure by substituting each `{ref}` in its
/// template with the referent's built expression (topologically, via
/// `resolver`). A dependency living in a CTE resolves to the CTE's
/// already-aliased column instead - `resolver` is responsible for that
/// distinction.
pub fn build_calculated(
    template: &str,
    mut resolver: impl FnMut(&str) -> Expr,
) -> Expr {
    let mut result = String::new();
    let mut refs: HashMap<String, usize> = HashMap::new();
    let mut placeholders: Vec<Expr> = Vec::new();

    let mut chars = template.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c == '{' {
            let mut name = String::new();
            for (_, c2) in chars.by_ref() {
                if c2 == '}' {
                    break;
                }
                name.push(c2);
            }
            let idx = *refs.entry(name.clone()).or_insert_with(|| {
                placeholders.push(resolver(&name));
                placeholders.len() - 1
            });
            result.push_str(&format!("\u{0}{idx}\u{0}"));
        } else {
            result.push(c);
        }
    }

    raw_template_to_expr(&result, &placeholders)
}

/// Parses the substituted template string (still containing arithmetic
/// operators and `\0N\0` placeholder markers) into an `Expr` tree. Only
/// `+ - * /` and parentheses are supported, matching the arithmetic a
/// calculated-measure template is expected to use.
fn raw_template_to_expr(template: &str, placeholders: &[Expr]) -> Expr {
    let tokens = tokenize_template(template, placeholders);
    let mut parser = TemplateParser { tokens, pos: 0 };
    parser.parse_expr()
}

#[derive(Debug, Clone)]
enum TemplateToken {
    Expr(Expr),
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize_template(template: &str, placeholders: &[Expr]) -> Vec<TemplateToken> {
    let mut tokens = Vec::new();
    let mut chars = template.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            '\u{0}' => {
                chars.next();
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d == '\u{0}' {
                        chars.next();
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                let idx: usize = digits.parse().expect("placeholder index");
                tokens.push(TemplateToken::Expr(placeholders[idx].clone()));
            }
            '+' => {
                chars.next();
                tokens.push(TemplateToken::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(TemplateToken::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(TemplateToken::Star);
            }
            '/' => {
                chars.next();
                tokens.push(TemplateToken::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(TemplateToken::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(TemplateToken::RParen);
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut num = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(TemplateToken::Num(num.parse().unwrap_or(0.0)));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        name.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(TemplateToken::Expr(crate::sql::func(&name, vec![])));
            }
            _ => {
                chars.next();
            }
        }
    }
    tokens
}

struct TemplateParser {
    tokens: Vec<TemplateToken>,
    pos: usize,
}

impl TemplateParser {
    fn peek(&self) -> Option<&TemplateToken> {
        self.tokens.get(self.pos)
    }

    fn parse_expr(&mut self) -> Expr {
        let mut left = self.parse_term();
        loop {
            match self.peek() {
                Some(TemplateToken::Plus) => {
                    self.pos += 1;
                    left = crate::sql::ExprExt::add(left, self.parse_term());
                }
                Some(TemplateToken::Minus) => {
                    self.pos += 1;
                    left = crate::sql::ExprExt::sub(left, self.parse_term());
                }
                _ => break,
            }
        }
        left
    }

    fn parse_term(&mut self) -> Expr {
        let mut left = self.parse_atom();
        loop {
            match self.peek() {
                Some(TemplateToken::Star) => {
                    self.pos += 1;
                    left = crate::sql::ExprExt::mul(left, self.parse_atom());
                }
                Some(TemplateToken::Slash) => {
                    self.pos += 1;
                    left = crate::sql::ExprExt::div(left, self.parse_atom());
                }
                _ => break,
            }
        }
        left
    }

    fn parse_atom(&mut self) -> Expr {
        match self.tokens.get(self.pos).cloned() {
            Some(TemplateToken::Expr(e)) => {
                self.pos += 1;
                e
            }
            Some(TemplateToken::Num(n)) => {
                self.pos += 1;
                crate::sql::lit_float(n)
            }
            Some(TemplateToken::LParen) => {
                self.pos += 1;
                let inner = self.parse_expr();
                if matches!(self.peek(), Some(TemplateToken::RParen)) {
                    self.pos += 1;
                }
                inner
            }
            _ => crate::sql::lit_null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Column;
    use crate::query::Operator;
    use crate::sql::{col, ExprExt};

    #[test]
    fn test_build_simple_count() {
        let measure = MeasureDef::simple(
            AggregationType::Count,
            std::sync::Arc::new(|_ctx: &QueryContext| {
                crate::model::ColumnExpr::Column(Column::new("employees", "id"))
            }),
        );
        let ctx = QueryContext::new("default", serde_json::json!({}));
        let cache = FilterSqlCache::new();
        let expr = build_simple(&measure, &ctx, &cache, |_| crate::sql::lit_bool(true)).unwrap();
        match expr {
            Expr::Function { name, .. } => assert_eq!(name, "COUNT"),
            _ => panic!("expected COUNT"),
        }
    }

    #[test]
    fn test_build_simple_with_inline_filter_wraps_in_case() {
        let measure = MeasureDef::Simple {
            kind: AggregationType::Count,
            sql: std::sync::Arc::new(|_ctx: &QueryContext| {
                crate::model::ColumnExpr::Column(Column::new("employees", "id"))
            }),
            filters: vec![Condition {
                member: "Employees.active".into(),
                operator: Operator::Equals,
                values: vec![serde_json::json!(true)],
                date_range: None,
            }],
        };
        let ctx = QueryContext::new("default", serde_json::json!({}));
        let cache = FilterSqlCache::new();
        let expr = build_simple(&measure, &ctx, &cache, |_| {
            col("active").eq(crate::sql::lit_bool(true))
        })
        .unwrap();
        match expr {
            Expr::Function { args, .. } => {
                assert!(matches!(args[0], Expr::Case { .. }));
            }
            _ => panic!("expected COUNT wrapping a CASE"),
        }
    }

    #[test]
    fn test_build_calculated_substitutes_refs() {
        let expr = build_calculated("({active}/{count})*100", |name| {
            crate::sql::col(name)
        });
        // Division then multiplication: ((active/count)*100)
        match expr {
            Expr::BinaryOp { op, .. } => assert_eq!(op, crate::sql::BinaryOperator::Mul),
            _ => panic!("expected top-level multiplication"),
        }
    }
}
