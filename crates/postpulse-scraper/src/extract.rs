//! Post extraction from a rendered DOM snapshot.
//!
//! Everything here is synchronous and side-effect free: the browser hands over
//! `page.content()` and this module reads it with `scraper`.

use std::sync::LazyLock;

use postpulse_core::{is_substantive, MetricSelectors, SelectorConfig};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Longest text kept from the whole-container fallback.
pub const FALLBACK_TEXT_MAX_CHARS: usize = 500;

static UI_CHROME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(Like|Comment|Repost|Send|Share|\d+\s*(likes?|comments?|reposts?))")
        .expect("valid ui chrome regex")
});
static SEE_MORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*(…|\.\.\.)\s*see more$").expect("valid see-more regex")
});

/// One post as found on the page, counters still in display form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPost {
    pub text: String,
    pub likes_text: Option<String>,
    pub comments_text: Option<String>,
    pub reposts_text: Option<String>,
}

#[derive(Debug, Clone)]
struct MetricRule {
    selectors: Vec<Selector>,
    aria_label_selectors: Vec<Selector>,
    keyword: Option<String>,
}

impl MetricRule {
    fn compile(field: &'static str, metric: &MetricSelectors) -> Self {
        Self {
            selectors: compile_list(field, &metric.selectors),
            aria_label_selectors: compile_list(field, &metric.aria_label_selectors),
            keyword: metric.keyword.as_ref().map(|k| k.to_lowercase()),
        }
    }

    fn accepts(&self, candidate: &str) -> bool {
        self.keyword
            .as_deref()
            .is_none_or(|keyword| candidate.to_lowercase().contains(keyword))
    }

    fn find(&self, container: ElementRef<'_>) -> Option<String> {
        for selector in &self.selectors {
            for element in container.select(selector) {
                let text = visible_text(element);
                if !text.is_empty() && self.accepts(&text) {
                    return Some(text);
                }
            }
        }

        for selector in &self.aria_label_selectors {
            for element in container.select(selector) {
                if let Some(label) = element.value().attr("aria-label") {
                    let label = collapse_whitespace(label);
                    if !label.is_empty() && self.accepts(&label) {
                        return Some(label);
                    }
                }
            }
        }

        None
    }
}

/// Parsed form of a [`SelectorConfig`]. Selectors that fail to parse are
/// dropped with a warning so one bad entry does not disable extraction.
#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    containers: Vec<Selector>,
    text: Vec<Selector>,
    likes: MetricRule,
    comments: MetricRule,
    reposts: MetricRule,
}

impl CompiledSelectors {
    #[must_use]
    pub fn compile(config: &SelectorConfig) -> Self {
        Self {
            containers: compile_list("post_containers", &config.post_containers),
            text: compile_list("post_text", &config.post_text),
            likes: MetricRule::compile("likes", &config.likes),
            comments: MetricRule::compile("comments", &config.comments),
            reposts: MetricRule::compile("reposts", &config.reposts),
        }
    }
}

fn compile_list(field: &'static str, raw: &[String]) -> Vec<Selector> {
    raw.iter()
        .filter_map(|css| match Selector::parse(css) {
            Ok(selector) => Some(selector),
            Err(e) => {
                tracing::warn!(field, selector = %css, error = %e, "skipping invalid CSS selector");
                None
            }
        })
        .collect()
}

/// Extract up to `max_count` posts from `html`.
///
/// The first container selector with at least one match defines the post set.
/// Containers whose cleaned text is too short to be content are skipped.
#[must_use]
pub fn extract_posts(html: &str, selectors: &CompiledSelectors, max_count: usize) -> Vec<RawPost> {
    let document = Html::parse_document(html);

    let Some(containers) = selectors
        .containers
        .iter()
        .map(|selector| document.select(selector).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
    else {
        tracing::debug!("no post containers matched");
        return Vec::new();
    };

    containers
        .into_iter()
        .filter_map(|container| extract_one(container, selectors))
        .take(max_count)
        .collect()
}

fn extract_one(container: ElementRef<'_>, selectors: &CompiledSelectors) -> Option<RawPost> {
    let text = post_text(container, &selectors.text)?;
    if !is_substantive(&text) {
        return None;
    }

    Some(RawPost {
        text,
        likes_text: selectors.likes.find(container),
        comments_text: selectors.comments.find(container),
        reposts_text: selectors.reposts.find(container),
    })
}

fn post_text(container: ElementRef<'_>, text_selectors: &[Selector]) -> Option<String> {
    for selector in text_selectors {
        if let Some(element) = container.select(selector).next() {
            let text = visible_text(element);
            if is_substantive(&text) {
                return Some(SEE_MORE_RE.replace(&text, "").trim().to_string());
            }
        }
    }

    let all_text = container.text().collect::<Vec<_>>().join(" ");
    let cleaned = collapse_whitespace(&UI_CHROME_RE.replace_all(&all_text, ""));
    if is_substantive(&cleaned) {
        Some(cleaned.chars().take(FALLBACK_TEXT_MAX_CHARS).collect())
    } else {
        None
    }
}

fn visible_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;
