//! Resort identifier from the page path.

use std::sync::LazyLock;

use regex::Regex;

static RESORT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/resorts/([^/]+)/rates-rooms").expect("resort path pattern is valid")
});

/// The path segment between `/resorts/` and `/rates-rooms`, if present.
///
/// ```
/// use range_scout::resort::resort_id_from_path;
///
/// assert_eq!(
///     resort_id_from_path("/resorts/grand-floridian/rates-rooms").as_deref(),
///     Some("grand-floridian")
/// );
/// assert_eq!(resort_id_from_path("/resorts//rates-rooms"), None);
/// ```
pub fn resort_id_from_path(path: &str) -> Option<String> {
    RESORT_PATH
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
