//! Splitting very large fragments at safe block boundaries.

use std::ops::Range;

use super::markup::balanced_spans;
use super::protect::MSO_LIST_RUN;
use crate::policy::CHUNK_SUFFIX;

/// Fragments longer than this are cleaned chunk by chunk.
pub const CHUNK_THRESHOLD: usize = 40_000;

/// Target chunk length in bytes.
pub const CHUNK_SIZE: usize = 40_000;

/// Closing tags after which a chunk may end.
pub const SAFE_BREAKS: &[&str] = &[
    "</p>", "</div>", "</h1>", "</h2>", "</h3>", "</h4>", "</h5>", "</h6>", "</table>", "</ul>", "</ol>",
];

const CHUNKABLE_TYPES: &[&str] = &["post", "page", "wp_content", "acf_wysiwyg"];

/// Whether content of this type may be split.
pub fn is_chunkable(content_type: &str) -> bool {
    !content_type.ends_with(CHUNK_SUFFIX) && CHUNKABLE_TYPES.contains(&content_type)
}

pub fn needs_chunking(content: &str, content_type: &str) -> bool {
    content.len() > CHUNK_THRESHOLD && is_chunkable(content_type)
}

/// Split `content` into pieces of roughly `chunk_size` bytes.
///
/// Each piece except the last ends right after the first safe closing tag
/// at or beyond its size boundary. Boundaries never fall inside a table, a
/// list or a run of Word list paragraphs. If no safe break remains, the
/// rest of the content becomes the final piece. Concatenating the pieces
/// yields `content` again.
pub fn split_chunks(content: &str, chunk_size: usize) -> Vec<&str> {
    let chunk_size = chunk_size.max(1);
    let lower = content.to_ascii_lowercase();
    let mut zones = balanced_spans(content, &["table"]);
    zones.extend(balanced_spans(content, &["ul", "ol"]));
    if let Ok(re) = MSO_LIST_RUN.regex() {
        zones.extend(re.find_iter(content).map(|m| m.range()));
    }

    let mut chunks = Vec::new();
    let mut offset = 0;
    while offset < content.len() {
        let target = offset + chunk_size;
        if target >= content.len() {
            chunks.push(&content[offset..]);
            break;
        }
        match next_safe_break(&lower, target, &zones) {
            Some(end) => {
                chunks.push(&content[offset..end]);
                offset = end;
            }
            None => {
                chunks.push(&content[offset..]);
                break;
            }
        }
    }
    chunks
}

fn next_safe_break(lower: &str, from: usize, zones: &[Range<usize>]) -> Option<usize> {
    let mut from = from;
    while !lower.is_char_boundary(from) {
        from += 1;
    }
    SAFE_BREAKS
        .iter()
        .filter_map(|tag| {
            let mut search = from;
            loop {
                let pos = search + lower.get(search..)?.find(tag)?;
                let end = pos + tag.len();
                match zones.iter().find(|zone| zone.start < end && end < zone.end) {
                    Some(zone) => search = zone.end.max(pos + 1),
                    None => return Some(end),
                }
            }
        })
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_top_level_content_types_are_chunked() {
        assert!(is_chunkable("post"));
        assert!(is_chunkable("acf_wysiwyg"));
        assert!(!is_chunkable("post_chunk"));
        assert!(!is_chunkable("excerpt"));
        assert!(!needs_chunking("<p>short</p>", "post"));
    }

    #[test]
    fn chunks_end_on_safe_tags_and_concatenate_back() {
        let html = "<p>aaaa</p><div>bbbb</div><p>cccc</p>".repeat(20);
        let chunks = split_chunks(&html, 50);
        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), html);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(SAFE_BREAKS.iter().any(|tag| chunk.ends_with(tag)), "bad break: {chunk}");
        }
    }

    #[test]
    fn never_breaks_inside_a_table() {
        let table = format!("<table><tr><td><p>{}</p></td></tr></table>", "x".repeat(100));
        let html = format!("<p>intro</p>{table}<p>outro</p>");
        let chunks = split_chunks(&html, 5);
        assert_eq!(chunks.concat(), html);
        assert!(chunks.iter().any(|chunk| chunk.contains(&table)));
    }

    #[test]
    fn no_break_available_keeps_the_rest_together() {
        let html = format!("<p>{}", "y".repeat(100));
        assert_eq!(split_chunks(&html, 10), vec![html.as_str()]);
    }

    #[test]
    fn multibyte_boundaries_are_safe() {
        let html = "<p>éééé</p>".repeat(10);
        let chunks = split_chunks(&html, 3);
        assert_eq!(chunks.concat(), html);
    }
}
