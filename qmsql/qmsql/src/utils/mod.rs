use std::sync::OnceLock;

use regex::Regex;

pub trait OrMap<T> {
    /// Merges two options into one using `f`.
    /// If one of the options is None, results defaults to the other one.
    fn or_map<F>(self, b: Self, f: F) -> Self
    where
        F: FnOnce(T, T) -> T;
}

impl<T> OrMap<T> for Option<T> {
    fn or_map<F>(self, b: Self, f: F) -> Self
    where
        F: FnOnce(T, T) -> T,
    {
        match (self, b) {
            (Some(a), Some(b)) => Some(f(a, b)),
            (a, None) => a,
            (None, b) => b,
        }
    }
}

/// Identifiers that can be emitted without quoting (keywords aside).
pub(crate) fn valid_ident() -> &'static Regex {
    static VALID_IDENT: OnceLock<Regex> = OnceLock::new();
    VALID_IDENT.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap())
}

/// Returns `base`, or `base` suffixed with the lowest counter (starting at 0)
/// that makes it distinct from every name for which `taken` returns true.
///
/// Names are cut to fit into `max_len` characters, counter included.
pub(crate) fn unique_name<F>(base: &str, max_len: usize, taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    let name = truncate(base, max_len);
    if !taken(name) {
        return name.to_string();
    }

    let mut counter = 0usize;
    loop {
        let suffix = counter.to_string();
        let stem = truncate(base, max_len.saturating_sub(suffix.len()));
        let name = format!("{stem}{suffix}");
        if !taken(&name) {
            return name;
        }
        counter += 1;
    }
}

fn truncate(name: &str, max_len: usize) -> &str {
    match name.char_indices().nth(max_len) {
        Some((end, _)) => &name[..end],
        None => name,
    }
}
