//! Content extraction: split a raw answer text into ordered text/image/file
//! spans.
//!
//! Answers arrive as markdown with inline media links. Markdown images and
//! file links are lifted out as their own spans; when the markdown carries no
//! media, bare URLs are scanned as a fallback. Remaining text is cleaned of
//! markdown syntax the chat transports cannot render.

use regex::Regex;

use courier_common::types::SegmentKind;

/// One extracted span of a raw answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSpan {
    pub kind: SegmentKind,
    pub value: String,
}

impl ExtractedSpan {
    fn text(value: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Text,
            value: value.into(),
        }
    }
}

/// Pluggable raw-answer segmentation.
pub trait ContentExtractor: Send + Sync {
    /// Extract ordered spans from a raw answer text.
    fn extract(&self, raw: &str) -> Vec<ExtractedSpan>;
}

/// Markdown-aware extractor.
pub struct MarkdownExtractor {
    md_image: Regex,
    md_link: Regex,
    file_ext: Regex,
    bare_image_url: Regex,
    bare_file_url: Regex,
    bold: Regex,
    italic: Regex,
    code_block: Regex,
    inline_code: Regex,
    blank_runs: Regex,
}

impl Default for MarkdownExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownExtractor {
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn new() -> Self {
        let re = |pattern: &str| Regex::new(pattern).expect("static pattern");
        Self {
            md_image: re(r"!\[([^\]]*)\]\(([^)]+)\)"),
            md_link: re(r"\[([^\]]+)\]\(([^)]+)\)"),
            file_ext: re(r"(?i)\.(pdf|docx?|xlsx?|pptx?|txt|html?|zip|rar|7z|tar|gz|csv|json|xml)(\?[^)\s]*)?$"),
            bare_image_url: re(r"(?i)https?://[^\s]+?\.(jpg|jpeg|png|gif|webp|bmp)"),
            bare_file_url: re(r"(?i)https?://[^\s]+?\.(docx?|pdf|xlsx?|pptx?|txt|zip|rar)"),
            bold: re(r"\*\*(.*?)\*\*"),
            italic: re(r"\*(.*?)\*"),
            code_block: re(r"(?s)```.*?```"),
            inline_code: re(r"`([^`]+)`"),
            blank_runs: re(r"\n\s*\n"),
        }
    }

    fn clean_text(&self, text: &str) -> String {
        let cleaned = self.code_block.replace_all(text, "");
        let cleaned = self.bold.replace_all(&cleaned, "$1");
        let cleaned = self.italic.replace_all(&cleaned, "$1");
        let cleaned = self.inline_code.replace_all(&cleaned, "$1");
        let cleaned = self.blank_runs.replace_all(cleaned.trim(), "\n\n");
        cleaned.trim().to_string()
    }
}

impl ContentExtractor for MarkdownExtractor {
    fn extract(&self, raw: &str) -> Vec<ExtractedSpan> {
        if raw.is_empty() {
            return vec![ExtractedSpan::text("")];
        }

        let mut spans: Vec<ExtractedSpan> = Vec::new();
        let mut remaining = raw.to_string();

        // Markdown images: `![alt](url)`.
        for caps in self.md_image.captures_iter(raw) {
            let (whole, url) = (&caps[0], &caps[2]);
            spans.push(ExtractedSpan {
                kind: SegmentKind::Image,
                value: url.to_string(),
            });
            remaining = remaining.replacen(whole, "", 1);
        }

        // Markdown links: file links become File spans, ordinary links keep
        // their label in the text.
        let link_source = remaining.clone();
        for caps in self.md_link.captures_iter(&link_source) {
            let (whole, label, url) = (&caps[0], &caps[1], &caps[2]);
            if self.file_ext.is_match(url) {
                spans.push(ExtractedSpan {
                    kind: SegmentKind::File,
                    value: url.to_string(),
                });
                remaining = remaining.replacen(whole, "", 1);
            } else {
                remaining = remaining.replacen(whole, label, 1);
            }
        }

        // No markdown media found — scan for bare media URLs.
        if spans.is_empty() {
            let scan = remaining.clone();
            for m in self.bare_image_url.find_iter(&scan) {
                spans.push(ExtractedSpan {
                    kind: SegmentKind::Image,
                    value: m.as_str().to_string(),
                });
                remaining = remaining.replacen(m.as_str(), "", 1);
            }
            if spans.is_empty() {
                for m in self.bare_file_url.find_iter(&scan) {
                    spans.push(ExtractedSpan {
                        kind: SegmentKind::File,
                        value: m.as_str().to_string(),
                    });
                    remaining = remaining.replacen(m.as_str(), "", 1);
                }
            }
        }

        let cleaned = self.clean_text(&remaining);
        if !cleaned.is_empty() {
            spans.insert(0, ExtractedSpan::text(cleaned));
        }

        if spans.is_empty() {
            spans.push(ExtractedSpan::text(""));
        }
        spans
    }
}

/// Strip the markdown emphasis the chat transports render literally.
#[must_use]
pub fn strip_markdown(text: &str) -> String {
    // Bold is the one that shows up in practice; keep this cheap.
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("**") {
        if let Some(len) = rest[start + 2..].find("**") {
            out.push_str(&rest[..start]);
            out.push_str(&rest[start + 2..start + 2 + len]);
            rest = &rest[start + 2 + len + 2..];
        } else {
            break;
        }
    }
    out.push_str(rest);
    out
}
