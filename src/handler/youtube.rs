//! YouTube: watch pages and Shorts.

use super::engine::Heuristics;
use crate::capture::VideoMetadata;
use crate::dom::Page;
use crate::platform::{extract_video_id, is_shorts_url, Platform};

const WATCH_PLAYER: &str = "#movie_player";
const SHORTS_RENDERER: &str = "ytd-reel-video-renderer";
const SHORTS_ITEMS: &str = "ytd-reel-video-renderer, #shorts-player";
const WATCH_ACTIONS: &str = "#actions #top-level-buttons-computed";
const SHORTS_ACTIONS: &str = "#actions";

const WATCH_TITLE: &[&str] = &[
    "#title h1.ytd-watch-metadata",
    "h1.ytd-video-primary-info-renderer",
    "h1.ytd-watch-metadata",
    "#title h1",
];
const WATCH_CHANNEL: &[&str] = &["#channel-name a", ".ytd-video-owner-renderer a", "#owner-name a"];
const WATCH_VIEWS: &[&str] = &["#info-text .view-count", ".ytd-video-view-count-renderer"];
const WATCH_DESCRIPTION: &[&str] = &["#description", ".ytd-expandable-video-description-body-renderer"];
const LIKE_BUTTON: &str = r#"button[aria-label*="like"]"#;
const SHORTS_TITLE: &[&str] = &[".title", "h2"];
const SHORTS_CHANNEL: &[&str] = &["#channel-name a", ".ytd-channel-name a"];

/// YouTube loads videos through navigation, not scrolling, so it has no
/// scroll watcher.
pub struct YouTube;

impl YouTube {
    fn is_shorts<P: Page>(page: &P) -> bool {
        is_shorts_url(&page.href())
    }
}

impl<P: Page> Heuristics<P> for YouTube {
    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    fn watches_scroll(&self) -> bool {
        false
    }

    fn find_candidates(&self, page: &P) -> Vec<P::Node> {
        if YouTube::is_shorts(page) {
            page.query_all(None, SHORTS_ITEMS)
        } else {
            page.query_all(None, WATCH_PLAYER)
        }
    }

    fn control_host(&self, page: &P, container: &P::Node) -> P::Node {
        let host = if YouTube::is_shorts(page) {
            page.query(Some(container), SHORTS_ACTIONS)
        } else {
            page.query(None, WATCH_ACTIONS)
        };
        host.unwrap_or_else(|| container.clone())
    }

    /// On Shorts the renderer wins over the inner player: it holds the title.
    fn container_of(&self, page: &P, video: &P::Node) -> Option<P::Node> {
        if YouTube::is_shorts(page) {
            page.closest(video, SHORTS_RENDERER)
                .or_else(|| page.closest(video, SHORTS_ITEMS))
        } else {
            page.closest(video, WATCH_PLAYER)
        }
    }

    fn extract_metadata(&self, page: &P, container: Option<&P::Node>, href: &str) -> VideoMetadata {
        let shorts = is_shorts_url(href);

        let metadata = if shorts {
            VideoMetadata {
                title: page.first_text(container, SHORTS_TITLE),
                author: page.first_text(container, SHORTS_CHANNEL),
                ..Default::default()
            }
        } else {
            VideoMetadata {
                title: page.first_text(None, WATCH_TITLE),
                author: page.first_text(None, WATCH_CHANNEL),
                views: page.first_text(None, WATCH_VIEWS),
                likes: page
                    .query(None, LIKE_BUTTON)
                    .and_then(|button| page.attribute(&button, "aria-label")),
                ..Default::default()
            }
        };

        let caption = if shorts {
            metadata.title.clone()
        } else {
            page.first_text(None, WATCH_DESCRIPTION)
        };

        VideoMetadata {
            video_id: extract_video_id(Platform::YouTube, href),
            is_shorts: Some(shorts),
            ..metadata
        }
        .with_caption(caption)
    }
}
