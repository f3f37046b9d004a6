use std::collections::HashSet;
use std::sync::OnceLock;

/// Reserved words that cannot be used as bare identifiers in any of the
/// supported dialects.
fn keywords() -> &'static HashSet<&'static str> {
    static KEYWORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    KEYWORDS.get_or_init(|| {
        [
            "all", "alter", "and", "any", "apply", "as", "asc", "between", "by", "case", "cast",
            "check", "collate", "column", "constraint", "create", "cross", "current",
            "current_date", "current_time", "current_timestamp", "default", "delete", "desc",
            "distinct", "drop", "else", "end", "escape", "except", "exists", "false", "fetch",
            "for", "foreign", "from", "full", "group", "having", "in", "index", "inner", "insert",
            "intersect", "into", "is", "join", "key", "lateral", "left", "like", "limit", "natural",
            "not", "null", "offset", "on", "only", "or", "order", "outer", "over", "partition",
            "primary", "references", "right", "rows", "select", "set", "some", "table", "then",
            "to", "top", "true", "union", "unique", "update", "user", "using", "values", "when",
            "where", "window", "with",
        ]
        .into_iter()
        .collect()
    })
}

pub(super) fn is_keyword(ident: &str) -> bool {
    keywords().contains(ident.to_ascii_lowercase().as_str())
}
