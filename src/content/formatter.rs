use std::cmp::Reverse;
use std::fmt::Write;

use crate::vk::types::{Attachment, PhotoSize, WallPost};

/// Canonical URL of a wall post, when both ids are known.
pub fn post_url(post: &WallPost) -> Option<String> {
    match (post.owner_id, post.id) {
        (Some(owner), Some(id)) if owner != 0 && id != 0 => {
            Some(format!("https://vk.com/wall{}_{}", owner, id))
        }
        _ => None,
    }
}

/// Renders one wall post as an HTML fragment for a feed entry.
///
/// Post text is emitted verbatim inside a paragraph. Attachments follow in
/// their original order when `include_attachments` is set, and a link back
/// to the post on VK always comes last. Fragments are concatenated without
/// separators.
pub fn format_post(post: &WallPost, include_attachments: bool) -> String {
    let mut html = String::new();

    if !post.text.is_empty() {
        let _ = write!(html, "<p>{}</p>", post.text);
    }

    if include_attachments {
        for attachment in &post.attachments {
            write_attachment(&mut html, attachment);
        }
    }

    if let Some(url) = post_url(post) {
        let _ = write!(
            html,
            r#"<p><a href="{}" target="_blank">View original post on VK</a></p>"#,
            url
        );
    }

    html
}

fn write_attachment(html: &mut String, attachment: &Attachment) {
    match attachment.kind.as_str() {
        "photo" => {
            let Some(photo) = &attachment.photo else {
                return;
            };
            if let Some(url) = largest_size(&photo.sizes).and_then(|s| s.url.as_deref()) {
                let _ = write!(
                    html,
                    r#"<p><img src="{}" style="max-width:100%;" /></p>"#,
                    url
                );
            }
        }
        "link" => {
            let Some(url) = attachment.link.as_ref().and_then(|l| l.url.as_deref()) else {
                return;
            };
            let title = attachment
                .link
                .as_ref()
                .and_then(|l| l.title.as_deref())
                .filter(|t| !t.is_empty())
                .unwrap_or(url);
            write_anchor(html, url, title);
        }
        "video" => {
            let Some(video) = &attachment.video else {
                return;
            };
            // Both ids are required; zero counts as missing.
            let (Some(owner), Some(id)) = (
                video.owner_id.filter(|&n| n != 0),
                video.id.filter(|&n| n != 0),
            ) else {
                return;
            };
            let url = format!("https://vk.com/video{}_{}", owner, id);
            write_anchor(html, &url, video.title.as_deref().unwrap_or("Video"));
        }
        "doc" => {
            let Some(doc) = &attachment.doc else {
                return;
            };
            if let Some(url) = doc.url.as_deref().filter(|u| !u.is_empty()) {
                write_anchor(html, url, doc.title.as_deref().unwrap_or("Document"));
            }
        }
        _ => {}
    }
}

fn write_anchor(html: &mut String, url: &str, text: &str) {
    let _ = write!(html, r#"<p><a href="{}" target="_blank">{}</a></p>"#, url, text);
}

/// Tallest size wins; the first one listed wins a tie.
fn largest_size(sizes: &[PhotoSize]) -> Option<&PhotoSize> {
    sizes
        .iter()
        .filter(|s| s.url.is_some())
        .min_by_key(|s| Reverse(s.height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vk::types::{Doc, Link, Photo, Video};
    use pretty_assertions::assert_eq;

    fn post(text: &str, attachments: Vec<Attachment>) -> WallPost {
        WallPost {
            id: Some(5),
            owner_id: Some(-100),
            date: 1_700_000_000,
            text: text.to_string(),
            attachments,
            ..Default::default()
        }
    }

    fn photo(sizes: &[(&str, i64)]) -> Attachment {
        Attachment {
            kind: "photo".to_string(),
            photo: Some(Photo {
                sizes: sizes
                    .iter()
                    .map(|(url, height)| PhotoSize {
                        url: Some(url.to_string()),
                        width: 0,
                        height: *height,
                    })
                    .collect(),
            }),
            ..Default::default()
        }
    }

    fn link(url: &str, title: Option<&str>) -> Attachment {
        Attachment {
            kind: "link".to_string(),
            link: Some(Link {
                url: Some(url.to_string()),
                title: title.map(str::to_string),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_text_only() {
        let html = format_post(&post("Привет, <b>мир</b>", vec![]), true);
        assert_eq!(
            html,
            r#"<p>Привет, <b>мир</b></p><p><a href="https://vk.com/wall-100_5" target="_blank">View original post on VK</a></p>"#
        );
    }

    #[test]
    fn test_largest_photo_by_height() {
        let html = format_post(
            &post("", vec![photo(&[("s.jpg", 75), ("x.jpg", 604), ("m.jpg", 130)])]),
            true,
        );
        assert!(html.starts_with(r#"<p><img src="x.jpg" style="max-width:100%;" /></p>"#));
    }

    #[test]
    fn test_photo_tie_takes_first() {
        let html = format_post(&post("", vec![photo(&[("a.jpg", 100), ("b.jpg", 100)])]), true);
        assert!(html.contains("a.jpg"));
        assert!(!html.contains("b.jpg"));
    }

    #[test]
    fn test_link_title_falls_back_to_url() {
        let html = format_post(&post("", vec![link("https://example.com", None)]), true);
        assert!(html.starts_with(
            r#"<p><a href="https://example.com" target="_blank">https://example.com</a></p>"#
        ));
    }

    #[test]
    fn test_video_requires_both_ids() {
        let with_ids = Attachment {
            kind: "video".to_string(),
            video: Some(Video {
                id: Some(456),
                owner_id: Some(-100),
                title: None,
            }),
            ..Default::default()
        };
        let without_owner = Attachment {
            kind: "video".to_string(),
            video: Some(Video {
                id: Some(456),
                owner_id: None,
                title: Some("Lost".to_string()),
            }),
            ..Default::default()
        };

        let html = format_post(&post("", vec![with_ids, without_owner]), true);
        assert!(html.contains(
            r#"<p><a href="https://vk.com/video-100_456" target="_blank">Video</a></p>"#
        ));
        assert!(!html.contains("Lost"));
    }

    #[test]
    fn test_doc_defaults_and_missing_url() {
        let doc = |url: Option<&str>| Attachment {
            kind: "doc".to_string(),
            doc: Some(Doc {
                url: url.map(str::to_string),
                title: None,
            }),
            ..Default::default()
        };
        let html = format_post(&post("", vec![doc(Some("https://vk.com/doc1_2")), doc(None)]), true);
        assert_eq!(html.matches("Document").count(), 1);
    }

    #[test]
    fn test_attachment_order_preserved_and_unknown_ignored() {
        let poll = Attachment {
            kind: "poll".to_string(),
            ..Default::default()
        };
        let html = format_post(
            &post(
                "text",
                vec![
                    link("https://b.example", Some("B")),
                    poll,
                    photo(&[("p.jpg", 10)]),
                ],
            ),
            true,
        );
        let link_pos = html.find("https://b.example").unwrap();
        let photo_pos = html.find("p.jpg").unwrap();
        let back_pos = html.find("View original post").unwrap();
        assert!(html.find("<p>text</p>").unwrap() < link_pos);
        assert!(link_pos < photo_pos);
        assert!(photo_pos < back_pos);
    }

    #[test]
    fn test_attachments_skipped_when_disabled() {
        let html = format_post(&post("", vec![photo(&[("p.jpg", 10)])]), false);
        assert!(!html.contains("<img"));
    }

    #[test]
    fn test_no_backlink_without_ids() {
        let mut p = post("hi", vec![]);
        p.id = None;
        assert_eq!(format_post(&p, true), "<p>hi</p>");
    }

    #[test]
    fn test_formatting_is_deterministic() {
        let p = post(
            "x",
            vec![photo(&[("a.jpg", 1), ("b.jpg", 2)]), link("https://l", None)],
        );
        assert_eq!(format_post(&p, true), format_post(&p, true));
    }
}
