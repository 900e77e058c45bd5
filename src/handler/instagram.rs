//! Instagram: feed posts and reels.

use super::engine::Heuristics;
use crate::capture::VideoMetadata;
use crate::dom::Page;
use crate::platform::{extract_video_id, Platform};

const POST: &str = r#"article[role="presentation"], article, [role="article"], div[role="presentation"]"#;
const ACTION_BAR: &str = r#"section, [role="toolbar"]"#;
const AUTHOR: &[&str] = &[r#"header a[role="link"]"#, r#"a[role="link"]"#];
const CAPTION: &[&str] = &[
    r#"[data-testid="post-content"] span"#,
    "h1",
    r#"span[dir="auto"]"#,
];
const LIKES: &[&str] = &[r#"button[data-testid="like-count"]"#, r#"a[href*="liked_by"] span"#];
const PERMALINK: &str = r#"a[href*="/p/"], a[href*="/reel/"]"#;

pub struct Instagram;

impl<P: Page> Heuristics<P> for Instagram {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn watches_scroll(&self) -> bool {
        true
    }

    /// Posts holding at least one video. A carousel gets a single control.
    fn find_candidates(&self, page: &P) -> Vec<P::Node> {
        let mut containers: Vec<P::Node> = Vec::new();
        for video in page.query_all(None, "video") {
            let container = self
                .container_of(page, &video)
                .or_else(|| page.parent(&video));
            if let Some(container) = container {
                if !containers.contains(&container) {
                    containers.push(container);
                }
            }
        }
        containers
    }

    fn control_host(&self, page: &P, container: &P::Node) -> P::Node {
        page.query(Some(container), ACTION_BAR)
            .unwrap_or_else(|| container.clone())
    }

    fn container_of(&self, page: &P, video: &P::Node) -> Option<P::Node> {
        page.closest(video, POST)
    }

    fn extract_metadata(&self, page: &P, container: Option<&P::Node>, href: &str) -> VideoMetadata {
        let post_url = self.post_url(page, container, href);

        VideoMetadata {
            author: page.first_text(container, AUTHOR),
            likes: page.first_text(container, LIKES),
            video_id: extract_video_id(Platform::Instagram, &post_url),
            ..Default::default()
        }
        .with_caption(page.first_text(container, CAPTION))
    }

    fn post_url(&self, page: &P, container: Option<&P::Node>, href: &str) -> String {
        if extract_video_id(Platform::Instagram, href).is_some() {
            return href.to_string();
        }
        container
            .and_then(|container| page.query(Some(container), PERMALINK))
            .and_then(|link| page.attribute(&link, "href"))
            .map(|link| {
                if link.starts_with('/') {
                    format!("https://www.instagram.com{}", link)
                } else {
                    link
                }
            })
            .unwrap_or_else(|| href.to_string())
    }
}
