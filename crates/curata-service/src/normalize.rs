use url::Url;

const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid"];

/// Canonicalize a raw URL into its dedup key.
///
/// Two submissions are considered the same link iff their normalized
/// forms are equal. Never fails: input that does not parse as a URL is
/// trimmed and lowercased as a best-effort key.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_lowercase();
    };

    url.set_fragment(None);

    let filtered = url.query().map(strip_tracking_params);
    match filtered.as_deref() {
        None | Some("") => url.set_query(None),
        Some(query) => url.set_query(Some(query)),
    }

    let path = url.path();
    if path != "/" {
        if let Some(stripped) = path.strip_suffix('/') {
            let stripped = stripped.to_owned();
            url.set_path(&stripped);
        }
    }

    let mut normalized = url.to_string();
    // The url crate always serializes a root path as a trailing slash.
    if normalized.ends_with('/') {
        normalized.pop();
    }

    normalized.to_lowercase()
}

/// Drop tracking parameters while preserving the order and encoding of
/// everything else.
fn strip_tracking_params(query: &str) -> String {
    query
        .split('&')
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or(pair);
            !is_tracking_param(key)
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_entire_url() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM/Some/Path"),
            "https://example.com/some/path"
        );
    }

    #[test]
    fn test_removes_fragment() {
        assert_eq!(
            normalize_url("https://example.com/path#section-2"),
            "https://example.com/path"
        );
    }

    #[test]
    fn test_strips_trailing_slash_from_path() {
        assert_eq!(
            normalize_url("https://example.com/path/"),
            "https://example.com/path"
        );
    }

    #[test]
    fn test_strips_root_slash() {
        assert_eq!(normalize_url("https://example.com/"), "https://example.com");
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
    }

    #[test]
    fn test_strips_utm_parameters() {
        assert_eq!(
            normalize_url("https://example.com/a?utm_source=x&utm_medium=y"),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_strips_utm_parameters_case_insensitively() {
        assert_eq!(
            normalize_url("https://example.com/a?UTM_Source=x&b=2"),
            "https://example.com/a?b=2"
        );
    }

    #[test]
    fn test_strips_click_identifiers() {
        assert_eq!(
            normalize_url("https://example.com/a?fbclid=abc&gclid=def&mc_cid=1&mc_eid=2"),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_strips_tracking_params_in_any_position() {
        assert_eq!(
            normalize_url("https://example.com/a?b=2&utm_campaign=x&c=3"),
            "https://example.com/a?b=2&c=3"
        );
    }

    #[test]
    fn test_preserves_remaining_param_order() {
        assert_eq!(
            normalize_url("https://example.com/a?z=1&a=2&m=3"),
            "https://example.com/a?z=1&a=2&m=3"
        );
    }

    #[test]
    fn test_tracking_variants_share_a_key() {
        assert_eq!(
            normalize_url("HTTPS://Example.com/Path/?utm_source=x&b=2#frag"),
            normalize_url("https://example.com/Path?b=2")
        );
    }

    #[test]
    fn test_trailing_slash_and_fragment_are_insignificant() {
        let key = normalize_url("https://example.org/article");
        assert_eq!(normalize_url("https://example.org/article/"), key);
        assert_eq!(normalize_url("https://example.org/article#top"), key);
    }

    #[test]
    fn test_unparsable_input_falls_back_to_trim_and_lowercase() {
        assert_eq!(normalize_url("  Not A Url  "), "not a url");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize_url(""), "");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "HTTPS://Example.com/Path/?utm_source=x&b=2#frag",
            "https://example.com/",
            "https://example.com/a?b=2&c=3",
            "not a url",
        ];
        for input in inputs {
            let once = normalize_url(input);
            assert_eq!(normalize_url(&once), once, "not idempotent for {input}");
        }
    }
}
