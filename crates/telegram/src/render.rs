//! Entity-aware rendering of message text into Bot API HTML.

use {
    teloxide::types::{MessageEntity, MessageEntityKind, MessageEntityRef},
    topicdesk_common::html::{escape_attr, escape_html},
};

/// Render `text` with its formatting `entities` as HTML.
///
/// Entities must nest, which is what Telegram sends. Entities whose range
/// does not fall on the text are dropped.
pub fn entities_html(text: &str, entities: &[MessageEntity]) -> String {
    let mut spans: Vec<_> = MessageEntityRef::parse(text, entities)
        .into_iter()
        .filter(|e| e.start() < e.end() && text.get(e.range()).is_some())
        .filter_map(|e| tags(e.kind()).map(|(open, close)| (e.start(), e.end(), open, close)))
        .collect();
    // Outer spans open first.
    spans.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut out = String::with_capacity(text.len() + spans.len() * 8);
    let mut open: Vec<(usize, String)> = Vec::new();
    let mut pos = 0;
    for (start, end, open_tag, close_tag) in spans {
        close_until(text, &mut out, &mut open, &mut pos, start);
        out.push_str(&escape_html(&text[pos..start]));
        pos = start;
        out.push_str(&open_tag);
        open.push((end, close_tag));
    }
    close_until(text, &mut out, &mut open, &mut pos, text.len());
    out.push_str(&escape_html(&text[pos..]));
    out
}

/// Close every open span that ends at or before `limit`, innermost first.
fn close_until(
    text: &str,
    out: &mut String,
    open: &mut Vec<(usize, String)>,
    pos: &mut usize,
    limit: usize,
) {
    while let Some((end, _)) = open.last()
        && *end <= limit
    {
        let end = (*end).max(*pos);
        out.push_str(&escape_html(&text[*pos..end]));
        *pos = end;
        if let Some((_, close)) = open.pop() {
            out.push_str(&close);
        }
    }
}

fn tags(kind: &MessageEntityKind) -> Option<(String, String)> {
    let simple = |tag: &str| Some((format!("<{tag}>"), format!("</{tag}>")));
    match kind {
        MessageEntityKind::Bold => simple("b"),
        MessageEntityKind::Italic => simple("i"),
        MessageEntityKind::Underline => simple("u"),
        MessageEntityKind::Strikethrough => simple("s"),
        MessageEntityKind::Spoiler => simple("tg-spoiler"),
        MessageEntityKind::Code => simple("code"),
        MessageEntityKind::Blockquote => simple("blockquote"),
        MessageEntityKind::Pre { language: None } => simple("pre"),
        MessageEntityKind::Pre {
            language: Some(lang),
        } => Some((
            format!("<pre><code class=\"language-{}\">", escape_attr(lang)),
            "</code></pre>".to_string(),
        )),
        MessageEntityKind::TextLink { url } => Some((
            format!("<a href=\"{}\">", escape_attr(url.as_str())),
            "</a>".to_string(),
        )),
        MessageEntityKind::TextMention { user } => Some((
            format!("<a href=\"tg://user?id={}\">", user.id),
            "</a>".to_string(),
        )),
        MessageEntityKind::CustomEmoji { custom_emoji_id } => Some((
            format!("<tg-emoji emoji-id=\"{}\">", escape_attr(&custom_emoji_id.0)),
            "</tg-emoji>".to_string(),
        )),
        _ => None,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn entity(kind: MessageEntityKind, offset: usize, length: usize) -> MessageEntity {
        MessageEntity {
            kind,
            offset,
            length,
        }
    }

    #[test]
    fn plain_text_is_escaped() {
        assert_eq!(entities_html("a < b & c", &[]), "a &lt; b &amp; c");
    }

    #[test]
    fn bold_and_link_are_rendered() {
        let url = reqwest::Url::parse("https://example.com/?a=1&b=2").unwrap();
        let html = entities_html(
            "trip to sea",
            &[
                entity(MessageEntityKind::Bold, 0, 4),
                entity(MessageEntityKind::TextLink { url }, 8, 3),
            ],
        );
        assert_eq!(
            html,
            "<b>trip</b> to <a href=\"https://example.com/?a=1&amp;b=2\">sea</a>"
        );
    }

    #[test]
    fn nested_spans_close_innermost_first() {
        let html = entities_html(
            "bold italic",
            &[
                entity(MessageEntityKind::Italic, 5, 6),
                entity(MessageEntityKind::Bold, 0, 11),
            ],
        );
        assert_eq!(html, "<b>bold <i>italic</i></b>");
    }

    #[test]
    fn offsets_count_utf16_units() {
        // The emoji is two UTF-16 units wide.
        let html = entities_html("😀 hi", &[entity(MessageEntityKind::Italic, 3, 2)]);
        assert_eq!(html, "😀 <i>hi</i>");
    }

    #[test]
    fn mentions_and_urls_stay_plain() {
        let html = entities_html("@ann", &[entity(MessageEntityKind::Mention, 0, 4)]);
        assert_eq!(html, "@ann");
    }
}
