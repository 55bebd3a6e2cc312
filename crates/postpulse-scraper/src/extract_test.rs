use super::*;

const FEED_HTML: &str = r#"
<html><body>
  <div class="feed-shared-update-v2" data-urn="urn:li:activity:1">
    <div class="update-components-text"><span>Excited to share   our new
      Rust release today!</span> …see more</div>
    <ul>
      <li><span class="social-details-social-counts__reactions-count">1,234</span></li>
      <li class="social-details-social-counts__comments">
        <button aria-label="56 comments on Alice's post"><span aria-hidden="true">56 comments</span></button>
      </li>
    </ul>
    <button aria-label="7 reposts of Alice's post"><span aria-hidden="true">7 reposts</span></button>
  </div>

  <div class="feed-shared-update-v2" data-urn="urn:li:activity:2">
    <p>Hiring senior engineers in Berlin</p>
    <button>Like</button><button>Comment</button><span>12 likes</span>
  </div>

  <div class="feed-shared-update-v2" data-urn="urn:li:activity:3">
    <div class="feed-shared-text">Thoughts on async Rust and structured concurrency</div>
    <button aria-label="89 reactions">reactions</button>
    <li class="social-details-social-counts__comments">
      <button aria-label="3 comments"><span aria-hidden="true">3</span></button>
    </li>
  </div>

  <div class="feed-shared-update-v2" data-urn="urn:li:activity:4">
    <div class="update-components-text">Nice!</div>
  </div>
</body></html>
"#;

fn default_selectors() -> CompiledSelectors {
    CompiledSelectors::compile(&SelectorConfig::default())
}

#[test]
fn extracts_text_and_counter_strings() {
    let posts = extract_posts(FEED_HTML, &default_selectors(), 10);
    let first = &posts[0];
    assert_eq!(first.text, "Excited to share our new Rust release today!");
    assert_eq!(first.likes_text.as_deref(), Some("1,234"));
    assert_eq!(first.comments_text.as_deref(), Some("56 comments"));
    assert_eq!(first.reposts_text.as_deref(), Some("7 reposts"));
}

#[test]
fn falls_back_to_container_text_without_ui_chrome() {
    let posts = extract_posts(FEED_HTML, &default_selectors(), 10);
    let second = &posts[1];
    assert_eq!(second.text, "Hiring senior engineers in Berlin");
    assert_eq!(second.likes_text, None);
    assert_eq!(second.comments_text, None);
    assert_eq!(second.reposts_text, None);
}

#[test]
fn keyword_miss_falls_through_to_aria_label() {
    let posts = extract_posts(FEED_HTML, &default_selectors(), 10);
    let third = &posts[2];
    assert_eq!(
        third.text,
        "Thoughts on async Rust and structured concurrency"
    );
    assert_eq!(third.comments_text.as_deref(), Some("3 comments"));
    assert_eq!(third.likes_text.as_deref(), Some("89 reactions"));
}

#[test]
fn short_posts_are_discarded() {
    let posts = extract_posts(FEED_HTML, &default_selectors(), 10);
    assert_eq!(posts.len(), 3);
    assert!(posts.iter().all(|p| p.text.trim().chars().count() > 10));
}

#[test]
fn max_count_limits_output() {
    let posts = extract_posts(FEED_HTML, &default_selectors(), 2);
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[1].text, "Hiring senior engineers in Berlin");
}

#[test]
fn later_container_selector_used_when_earlier_ones_miss() {
    let html = r#"<html><body>
        <article class="artdeco-card"><span dir="ltr">A post inside a plain card layout</span></article>
    </body></html>"#;
    let posts = extract_posts(html, &default_selectors(), 5);
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].text, "A post inside a plain card layout");
}

#[test]
fn no_containers_yields_empty() {
    let posts = extract_posts("<html><body><p>login wall</p></body></html>", &default_selectors(), 5);
    assert!(posts.is_empty());
}

#[test]
fn invalid_selectors_are_skipped() {
    let config = SelectorConfig {
        post_containers: vec!["div[[".to_string(), "article".to_string()],
        ..SelectorConfig::default()
    };
    let html = r#"<article><div class="break-words">Still extracted with a broken selector</div></article>"#;
    let posts = extract_posts(html, &CompiledSelectors::compile(&config), 5);
    assert_eq!(posts.len(), 1);
}

#[test]
fn fallback_text_is_truncated() {
    let long = "word ".repeat(300);
    let html = format!(r#"<div data-urn="urn:li:activity:9"><p>{long}</p></div>"#);
    let posts = extract_posts(&html, &default_selectors(), 5);
    assert_eq!(posts[0].text.chars().count(), FALLBACK_TEXT_MAX_CHARS);
}
