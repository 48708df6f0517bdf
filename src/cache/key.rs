//! Cache-key generation (§4.3): canonicalized JSON + 32-bit FNV-1a.

use serde_json::Value as JsonValue;

use crate::config::CacheDefaults;
use crate::model::QueryContext;
use crate::query::{Filter, SemanticQuery};

const FNV_OFFSET_BASIS: u32 = 2166136261;
const FNV_PRIME: u32 = 16777619;

/// 32-bit FNV-1a, wrapping on overflow, rendered as 8 lowercase hex digits.
/// Non-cryptographic: cache keys are not a security boundary.
pub fn fnv1a_hex(input: &str) -> String {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in input.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{hash:08x}")
}

/// Serializes a JSON value with object keys sorted recursively at every
/// level, so structurally-equal values that differ only in key order hash
/// identically.
pub fn canonical_json_string(value: &JsonValue) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).unwrap());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Canonicalized string form of a query's measures/dimensions/filters/time
/// dimensions, per §4.3's sort rules. Distinct from `canonical_json_string`
/// (used for the security context) because it applies query-shape-specific
/// sorting (filter content-key order, value order within a condition) on
/// top of plain key sorting.
pub fn canonical_query_string(query: &SemanticQuery) -> String {
    let mut measures = query.measures.clone();
    measures.sort();
    let mut dimensions = query.dimensions.clone();
    dimensions.sort();

    let mut time_dimensions: Vec<&_> = query.time_dimensions.iter().collect();
    time_dimensions.sort_by(|a, b| a.dimension.cmp(&b.dimension));
    let time_dims_json: Vec<JsonValue> = time_dimensions
        .iter()
        .map(|td| {
            let mut compare = td
                .compare_date_range
                .clone()
                .unwrap_or_default()
                .iter()
                .map(super::super::query::DateRangeInput::canonical_string)
                .collect::<Vec<_>>();
            compare.sort();
            serde_json::json!({
                "dimension": td.dimension,
                "granularity": td.granularity,
                "dateRange": td.date_range.as_ref().map(super::super::query::DateRangeInput::canonical_string),
                "compareDateRange": compare,
            })
        })
        .collect();

    let mut filters: Vec<&Filter> = query.filters.iter().collect();
    filters.sort_by_key(|f| f.content_key());
    let filters_json: Vec<JsonValue> = filters.iter().map(|f| filter_to_sorted_json(f)).collect();

    let canonical = serde_json::json!({
        "measures": measures,
        "dimensions": dimensions,
        "timeDimensions": time_dims_json,
        "filters": filters_json,
        "order": query.order,
        "limit": query.limit,
        "offset": query.offset,
    });
    canonical_json_string(&canonical)
}

fn filter_to_sorted_json(filter: &Filter) -> JsonValue {
    match filter {
        Filter::Condition(c) => {
            let mut values = c.values.clone();
            values.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
            serde_json::json!({
                "member": c.member,
                "operator": c.operator,
                "values": values,
                "dateRange": c.date_range.as_ref().map(super::super::query::DateRangeInput::canonical_string),
            })
        }
        Filter::And { and } => {
            let mut parts: Vec<JsonValue> = and.iter().map(filter_to_sorted_json).collect();
            parts.sort_by_key(|v| v.to_string());
            serde_json::json!({ "and": parts })
        }
        Filter::Or { or } => {
            let mut parts: Vec<JsonValue> = or.iter().map(filter_to_sorted_json).collect();
            parts.sort_by_key(|v| v.to_string());
            serde_json::json!({ "or": parts })
        }
    }
}

/// `prefix:query:H1[:ctx:H2]` per §4.3. The context segment is omitted when
/// the security context is `null` (no tenant scoping in play).
pub fn cache_key(query: &SemanticQuery, ctx: &QueryContext, defaults: &CacheDefaults) -> String {
    let query_hash = fnv1a_hex(&canonical_query_string(query));
    let mut key = format!("{}:query:{}", defaults.key_prefix, query_hash);
    if !ctx.security_context.is_null() {
        let ctx_hash = fnv1a_hex(&ctx.canonical_security_context());
        key.push_str(&format!(":ctx:{ctx_hash}"));
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Condition, Operator};
    use serde_json::json;

    #[test]
    fn test_fnv1a_hex_known_vector() {
        // FNV-1a 32-bit of the empty string is the offset basis itself.
        assert_eq!(fnv1a_hex(""), "811c9dc5");
    }

    #[test]
    fn test_fnv1a_hex_deterministic() {
        assert_eq!(fnv1a_hex("hello"), fnv1a_hex("hello"));
        assert_ne!(fnv1a_hex("hello"), fnv1a_hex("world"));
    }

    #[test]
    fn test_canonical_json_string_key_order_independent() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_json_string(&a), canonical_json_string(&b));
    }

    #[test]
    fn test_canonical_json_string_nested() {
        let a = json!({"outer": {"z": 1, "y": 2}});
        let b = json!({"outer": {"y": 2, "z": 1}});
        assert_eq!(canonical_json_string(&a), canonical_json_string(&b));
    }

    #[test]
    fn test_canonical_query_string_array_order_independent() {
        let mut q1 = SemanticQuery::default();
        q1.measures = vec!["B.count".into(), "A.count".into()];
        let mut q2 = SemanticQuery::default();
        q2.measures = vec!["A.count".into(), "B.count".into()];
        assert_eq!(canonical_query_string(&q1), canonical_query_string(&q2));
    }

    #[test]
    fn test_canonical_query_string_filter_value_order_independent() {
        let mut q1 = SemanticQuery::default();
        q1.filters = vec![Filter::Condition(Condition {
            member: "A.x".into(),
            operator: Operator::Equals,
            values: vec![json!(2), json!(1)],
            date_range: None,
        })];
        let mut q2 = SemanticQuery::default();
        q2.filters = vec![Filter::Condition(Condition {
            member: "A.x".into(),
            operator: Operator::Equals,
            values: vec![json!(1), json!(2)],
            date_range: None,
        })];
        assert_eq!(canonical_query_string(&q1), canonical_query_string(&q2));
    }

    #[test]
    fn test_cache_key_omits_ctx_segment_when_null() {
        let query = SemanticQuery::default();
        let ctx = QueryContext::new("default", JsonValue::Null);
        let defaults = CacheDefaults::default();
        let key = cache_key(&query, &ctx, &defaults);
        assert!(key.contains(":query:"));
        assert!(!key.contains(":ctx:"));
    }

    #[test]
    fn test_cache_key_includes_ctx_segment_when_present() {
        let query = SemanticQuery::default();
        let ctx = QueryContext::new("default", json!({"organisationId": 1}));
        let defaults = CacheDefaults::default();
        let key = cache_key(&query, &ctx, &defaults);
        assert!(key.contains(":ctx:"));
    }

    #[test]
    fn test_cache_key_deterministic_regardless_of_security_context_key_order() {
        let query = SemanticQuery::default();
        let ctx1 = QueryContext::new("default", json!({"a": 1, "b": 2}));
        let ctx2 = QueryContext::new("default", json!({"b": 2, "a": 1}));
        let defaults = CacheDefaults::default();
        assert_eq!(
            cache_key(&query, &ctx1, &defaults),
            cache_key(&query, &ctx2, &defaults)
        );
    }
}
