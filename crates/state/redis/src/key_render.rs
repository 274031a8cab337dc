use tollgate_state::{KeyKind, StateKey};

/// Render a [`StateKey`] into a Redis key string with the given prefix.
///
/// The format is `prefix:kind:id`.
pub fn render_key(prefix: &str, key: &StateKey) -> String {
    format!("{}:{}:{}", prefix, key.kind, key.id)
}

/// Key holding the highest field-record version issued under `prefix`.
///
/// It has no `kind:` segment, so no `SCAN` pattern for a kind matches it.
pub fn version_key(prefix: &str) -> String {
    format!("{prefix}:__versions")
}

/// `SCAN MATCH` pattern for ids of `kind` starting with `id_prefix`.
pub fn scan_pattern(prefix: &str, kind: &KeyKind, id_prefix: Option<&str>) -> String {
    format!("{}:{}:{}*", prefix, kind, id_prefix.unwrap_or_default())
}

/// Strip `prefix:kind:` from a rendered key, leaving the id.
pub fn strip_to_id<'a>(prefix: &str, kind: &KeyKind, rendered: &'a str) -> Option<&'a str> {
    rendered
        .strip_prefix(prefix)?
        .strip_prefix(':')?
        .strip_prefix(kind.as_str())?
        .strip_prefix(':')
}
