//! UTF-8 boundary-safe message splitting with numbered part prefixes.

/// Split `text` into chunks of at most `max_len` UTF-8 bytes, never cutting
/// inside a multi-byte character.
///
/// Returns an empty vec for empty input.
#[must_use]
pub fn split_by_utf8_length(text: &str, max_len: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // max_len is smaller than the next character; take it whole
            // rather than loop forever.
            end = (start + 1..=text.len())
                .find(|&i| text.is_char_boundary(i))
                .unwrap_or(text.len());
        }
        parts.push(text[start..end].to_string());
        start = end;
    }

    parts
}

/// Byte width of the `"[n/n] "` prefix for a given part count.
fn prefix_width(total_parts: usize) -> usize {
    format!("[{total_parts}/{total_parts}] ").len()
}

/// Split `text` for a transport capped at `max_len` bytes per message,
/// prefixing each part with its `"[i/n] "` position.
///
/// The prefix's own byte cost is subtracted from the cap before splitting,
/// and the split is redone when the adjusted part count changes the prefix
/// width (e.g. crossing 9 → 10 parts). Single-part text gets no prefix.
#[must_use]
pub fn split_numbered(text: &str, max_len: usize) -> Vec<String> {
    let estimate = split_by_utf8_length(text, max_len);
    if estimate.len() <= 1 {
        return estimate;
    }

    let adjusted = max_len.saturating_sub(prefix_width(estimate.len())).max(1);
    let mut parts = split_by_utf8_length(text, adjusted);
    if parts.len() != estimate.len() {
        let adjusted = max_len.saturating_sub(prefix_width(parts.len())).max(1);
        parts = split_by_utf8_length(text, adjusted);
    }

    let total = parts.len();
    parts
        .into_iter()
        .enumerate()
        .map(|(i, part)| format!("[{}/{}] {}", i + 1, total, part))
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(split_numbered("hello", 2048), vec!["hello".to_string()]);
    }

    #[test]
    fn empty_text_yields_no_parts() {
        assert!(split_by_utf8_length("", 10).is_empty());
    }

    #[test]
    fn five_thousand_ascii_bytes_make_three_parts() {
        let text = "a".repeat(5000);
        let parts = split_numbered(&text, 2048);

        assert_eq!(parts.len(), 3);
        for (i, part) in parts.iter().enumerate() {
            assert!(part.len() <= 2048, "part {i} is {} bytes", part.len());
            assert!(part.starts_with(&format!("[{}/3] ", i + 1)));
        }

        // Reassembly without prefixes is lossless.
        let rejoined: String = parts
            .iter()
            .enumerate()
            .map(|(i, part)| {
                part.strip_prefix(&format!("[{}/3] ", i + 1))
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(rejoined, text);
    }

    #[test]
    fn never_splits_inside_a_multibyte_character() {
        // Each CJK character is 3 bytes; a 10-byte cap cannot land mid-char.
        let text = "一二三四五六七八九十".repeat(20);
        let parts = split_by_utf8_length(&text, 10);

        for part in &parts {
            assert!(part.len() <= 10);
            assert!(std::str::from_utf8(part.as_bytes()).is_ok());
        }
        assert_eq!(parts.concat(), text);
    }

    #[test]
    fn numbered_parts_respect_cap_with_multibyte_text() {
        let text = "🙂".repeat(800); // 3200 bytes of 4-byte chars
        let parts = split_numbered(&text, 1000);

        let total = parts.len();
        for (i, part) in parts.iter().enumerate() {
            assert!(part.len() <= 1000);
            assert!(part.starts_with(&format!("[{}/{}] ", i + 1, total)));
        }
        let rejoined: String = parts
            .iter()
            .enumerate()
            .map(|(i, p)| {
                p.strip_prefix(&format!("[{}/{}] ", i + 1, total))
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(rejoined, text);
    }

    #[test]
    fn prefix_width_redo_when_count_changes() {
        // Craft a length where subtracting the prefix pushes the count up.
        let text = "b".repeat(2048 * 9);
        let parts = split_numbered(&text, 2048);

        let total = parts.len();
        assert!(total >= 9);
        for (i, part) in parts.iter().enumerate() {
            assert!(
                part.len() <= 2048,
                "part {} of {} is {} bytes",
                i + 1,
                total,
                part.len()
            );
        }
    }

    #[test]
    fn tiny_cap_still_makes_progress() {
        let parts = split_by_utf8_length("🙂🙂", 1);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts.concat(), "🙂🙂");
    }
}
