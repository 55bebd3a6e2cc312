//! Cache keys derived from user-supplied profile URLs and hashtags.

/// Strip surrounding whitespace and trailing slashes from a profile URL.
#[must_use]
pub fn canonical_profile_url(profile_url: &str) -> String {
    profile_url.trim().trim_end_matches('/').to_string()
}

/// Extract the username used as a profile document key.
///
/// Takes the path segment after `/in/` or `/company/`; any other URL falls
/// back to its last path segment. Returns `None` when nothing usable remains.
///
/// ```
/// use postpulse_core::profile_username;
/// assert_eq!(
///     profile_username("https://www.linkedin.com/in/alice/").as_deref(),
///     Some("alice")
/// );
/// ```
#[must_use]
pub fn profile_username(profile_url: &str) -> Option<String> {
    let canonical = canonical_profile_url(profile_url);
    let path = match url::Url::parse(&canonical) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => canonical.clone(),
    };
    let path = path.trim_end_matches('/');

    let segment = ["/in/", "/company/"]
        .iter()
        .find_map(|marker| {
            path.find(marker)
                .map(|idx| &path[idx + marker.len()..])
                .map(|rest| rest.split('/').next().unwrap_or_default())
        })
        .unwrap_or_else(|| path.rsplit('/').next().unwrap_or_default());

    let segment = segment.trim();
    if segment.is_empty() {
        None
    } else {
        Some(segment.to_string())
    }
}

/// Normalize a hashtag for use as a document key: trimmed, leading `#`
/// removed, lowercased.
///
/// Returns `None` for empty input or input containing whitespace or `/`.
#[must_use]
pub fn normalize_hashtag(raw: &str) -> Option<String> {
    let tag = raw.trim().trim_start_matches('#').to_lowercase();
    if tag.is_empty() || tag.chars().any(|c| c.is_whitespace() || c == '/') {
        return None;
    }
    Some(tag)
}
