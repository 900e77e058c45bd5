//! TikTok: feed items and single-video pages.

use super::engine::Heuristics;
use crate::capture::VideoMetadata;
use crate::dom::Page;
use crate::platform::{extract_video_id, Platform};

const FEED_ITEM: &str = r#"[data-e2e="recommend-list-item"]"#;
const VIDEO_PLAYER: &str = r#"[data-e2e="video-player"]"#;
const SIDE_ACTIONS: &str = r#"[data-e2e="video-side-actions"]"#;
const AUTHOR: &[&str] = &[r#"[data-e2e="video-author"]"#, r#"[data-e2e="browse-username"]"#];
const DESCRIPTION: &[&str] = &[r#"[data-e2e="video-desc"]"#, r#"[data-e2e="browse-video-desc"]"#];
const LIKES: &[&str] = &[r#"[data-e2e="like-count"]"#, r#"[data-e2e="browse-like-count"]"#];
const LIVE_BADGE: &str = r#"[data-e2e="live-tag"]"#;
const POST_LINK: &str = r#"a[href*="/video/"]"#;

pub struct TikTok;

impl<P: Page> Heuristics<P> for TikTok {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    fn watches_scroll(&self) -> bool {
        true
    }

    fn find_candidates(&self, page: &P) -> Vec<P::Node> {
        let items = page.query_all(None, FEED_ITEM);
        if !items.is_empty() {
            return items;
        }
        page.query_all(None, VIDEO_PLAYER)
    }

    fn control_host(&self, page: &P, container: &P::Node) -> P::Node {
        page.query(Some(container), SIDE_ACTIONS)
            .unwrap_or_else(|| container.clone())
    }

    fn container_of(&self, page: &P, video: &P::Node) -> Option<P::Node> {
        page.closest(video, &format!("{}, {}", FEED_ITEM, VIDEO_PLAYER))
    }

    fn extract_metadata(&self, page: &P, container: Option<&P::Node>, href: &str) -> VideoMetadata {
        let in_container = |selectors: &[&str]| {
            page.first_text(container, selectors)
                .or_else(|| page.first_text(None, selectors))
        };

        let post_url = self.post_url(page, container, href);
        let is_live = href.contains("/live") || page.query(container, LIVE_BADGE).is_some();

        VideoMetadata {
            author: in_container(AUTHOR),
            likes: in_container(LIKES),
            video_id: extract_video_id(Platform::TikTok, &post_url),
            is_live: Some(is_live),
            ..Default::default()
        }
        .with_caption(in_container(DESCRIPTION))
    }

    fn post_url(&self, page: &P, container: Option<&P::Node>, href: &str) -> String {
        if extract_video_id(Platform::TikTok, href).is_some() {
            return href.to_string();
        }
        container
            .and_then(|container| page.query(Some(container), POST_LINK))
            .and_then(|link| page.attribute(&link, "href"))
            .map(|link| absolutize(&link))
            .unwrap_or_else(|| href.to_string())
    }
}

fn absolutize(link: &str) -> String {
    if link.starts_with('/') {
        format!("https://www.tiktok.com{}", link)
    } else {
        link.to_string()
    }
}
