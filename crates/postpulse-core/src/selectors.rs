//! Data-driven selector lists for the scraped site.
//!
//! Markup on the target site drifts; every list here is evaluated in order
//! and the first selector that yields a usable result wins. The defaults
//! mirror `config/selectors.yaml`, and a YAML file may override any subset of
//! fields.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Fixed URLs of the scraped site. `{tag}` in the templates is replaced with
/// the normalized hashtag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteUrls {
    pub feed_url: String,
    pub login_url: String,
    pub hashtag_url_template: String,
    pub search_url_template: String,
    /// Substring a hashtag feed URL must contain after navigation.
    pub hashtag_url_marker: String,
}

impl Default for SiteUrls {
    fn default() -> Self {
        Self {
            feed_url: "https://www.linkedin.com/feed/".to_string(),
            login_url: "https://www.linkedin.com/login".to_string(),
            hashtag_url_template: "https://www.linkedin.com/feed/hashtag/{tag}/".to_string(),
            search_url_template:
                "https://www.linkedin.com/search/results/content/?keywords={tag}".to_string(),
            hashtag_url_marker: "hashtag".to_string(),
        }
    }
}

/// Selectors the session manager uses to log in and to recognise session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSelectors {
    /// Present only on authenticated pages.
    pub liveness_markers: Vec<String>,
    /// CAPTCHA / 2FA challenge elements that call for manual intervention.
    pub challenge_markers: Vec<String>,
    pub username_input: String,
    pub password_input: String,
    pub submit_button: String,
}

impl Default for SessionSelectors {
    fn default() -> Self {
        Self {
            liveness_markers: vec!["input[placeholder*='Search']".to_string()],
            challenge_markers: vec![
                "iframe[title*='reCAPTCHA']".to_string(),
                "input[name='pin']".to_string(),
            ],
            username_input: "input#username".to_string(),
            password_input: "input#password".to_string(),
            submit_button: "button[type='submit']".to_string(),
        }
    }
}

/// Selectors for one engagement counter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricSelectors {
    /// Elements whose visible text holds the count, tried in order.
    pub selectors: Vec<String>,
    /// Elements whose `aria-label` holds the count, tried after `selectors`.
    pub aria_label_selectors: Vec<String>,
    /// If set, a candidate text must contain this word (case-insensitive).
    pub keyword: Option<String>,
}

/// Locating the "show all posts" sub-page from a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileNavigation {
    pub posts_link_selectors: Vec<String>,
    /// Text the link must contain (case-insensitive) to be clicked.
    pub posts_link_text: String,
    /// Substring the URL must contain once the posts page is open.
    pub posts_url_marker: String,
}

impl Default for ProfileNavigation {
    fn default() -> Self {
        Self {
            posts_link_selectors: vec![
                "footer a.profile-creator-shared-content-view__footer-action".to_string(),
                "a.profile-creator-shared-content-view__footer-action".to_string(),
                "a[href*='/recent-activity/all/']".to_string(),
                "a[href*='/recent-activity/posts/']".to_string(),
                "a[href*='/recent-activity/']".to_string(),
            ],
            posts_link_text: "show all posts".to_string(),
            posts_url_marker: "recent-activity".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub site: SiteUrls,
    pub session: SessionSelectors,
    pub profile: ProfileNavigation,
    pub post_containers: Vec<String>,
    pub post_text: Vec<String>,
    pub likes: MetricSelectors,
    pub comments: MetricSelectors,
    pub reposts: MetricSelectors,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            site: SiteUrls::default(),
            session: SessionSelectors::default(),
            profile: ProfileNavigation::default(),
            post_containers: vec![
                "div[data-urn*='activity']".to_string(),
                "div.feed-shared-update-v2".to_string(),
                "article.artdeco-card".to_string(),
            ],
            post_text: vec![
                "div.update-components-text".to_string(),
                "div.feed-shared-text".to_string(),
                "div.break-words".to_string(),
                "span[dir='ltr']".to_string(),
            ],
            likes: MetricSelectors {
                selectors: vec![
                    "span.social-details-social-counts__reactions-count".to_string(),
                    "button[data-reaction-details] span.social-details-social-counts__reactions-count"
                        .to_string(),
                    "button[aria-label*='reactions'] span.social-details-social-counts__reactions-count"
                        .to_string(),
                ],
                aria_label_selectors: vec!["button[aria-label*='reactions']".to_string()],
                keyword: None,
            },
            comments: MetricSelectors {
                selectors: vec![
                    "li.social-details-social-counts__comments span[aria-hidden='true']"
                        .to_string(),
                ],
                aria_label_selectors: vec![
                    "li.social-details-social-counts__comments button".to_string(),
                ],
                keyword: Some("comment".to_string()),
            },
            reposts: MetricSelectors {
                selectors: vec![
                    "button[aria-label*='reposts of'] span[aria-hidden='true']".to_string(),
                ],
                aria_label_selectors: vec!["button[aria-label*='reposts of']".to_string()],
                keyword: Some("repost".to_string()),
            },
        }
    }
}

impl SelectorConfig {
    /// Hashtag feed URL for a normalized tag.
    #[must_use]
    pub fn hashtag_url(&self, tag: &str) -> String {
        self.site.hashtag_url_template.replace("{tag}", tag)
    }

    /// Content-search URL for a normalized tag; `#` is percent-encoded.
    #[must_use]
    pub fn hashtag_search_url(&self, tag: &str) -> String {
        self.site
            .search_url_template
            .replace("{tag}", &format!("%23{tag}"))
    }
}

/// Load and validate a selector configuration from a YAML file.
///
/// Fields missing from the file keep their built-in defaults.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_selectors(path: &Path) -> Result<SelectorConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SelectorsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let config: SelectorConfig =
        serde_yaml::from_str(&content).map_err(ConfigError::SelectorsFileParse)?;

    validate_selectors(&config)?;

    Ok(config)
}

/// Like [`load_selectors`], but a missing file yields `Ok(None)` so callers
/// can fall back to [`SelectorConfig::default`].
///
/// # Errors
///
/// Returns `ConfigError` if an existing file cannot be read, parsed, or
/// fails validation.
pub fn load_selectors_if_present(path: &Path) -> Result<Option<SelectorConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    load_selectors(path).map(Some)
}

fn validate_selectors(config: &SelectorConfig) -> Result<(), ConfigError> {
    if config.post_containers.iter().all(|s| s.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "post_containers must list at least one selector".to_string(),
        ));
    }

    if config
        .session
        .liveness_markers
        .iter()
        .all(|s| s.trim().is_empty())
    {
        return Err(ConfigError::Validation(
            "session.liveness_markers must list at least one selector".to_string(),
        ));
    }

    if !config.site.hashtag_url_template.contains("{tag}") {
        return Err(ConfigError::Validation(
            "site.hashtag_url_template must contain {tag}".to_string(),
        ));
    }

    Ok(())
}
