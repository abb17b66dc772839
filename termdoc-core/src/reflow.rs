//! Re-wraps extracted page text to an arbitrary column width.
//!
//! Two strategies are picked per page. Text that was typeset with short
//! manual line breaks (verse, code, tables of contents) keeps its lines and
//! only over-long lines are wrapped. Everything else is treated as prose:
//! paragraphs are joined and re-wrapped from scratch.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::DocumentKind;

pub const MIN_WIDTH: usize = 20;
const PREWRAPPED_RATIO: f64 = 0.3;

const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&#8217;", "'"),
    ("&#8220;", "\""),
    ("&#8221;", "\""),
    ("&#8230;", "..."),
    ("&#8212;", "\u{2014}"),
    ("&#8211;", "\u{2013}"),
    // last, so "&amp;lt;" stays "&lt;"
    ("&amp;", "&"),
];

pub fn reflow(text: &str, width: usize, kind: DocumentKind) -> Vec<String> {
    reflow_with(text, width, kind, MIN_WIDTH, PREWRAPPED_RATIO)
}

pub fn reflow_with(
    text: &str,
    width: usize,
    kind: DocumentKind,
    min_width: usize,
    prewrapped_ratio: f64,
) -> Vec<String> {
    let width = width.max(min_width).max(1);
    let mut text = text.replace("\r\n", "\n").replace('\r', "\n");
    if kind.has_markup_entities() {
        text = replace_entities(&text);
    }

    let lines: Vec<&str> = text.split('\n').collect();
    let mut out = if is_prewrapped(&lines, width, prewrapped_ratio) {
        reflow_prewrapped(&lines, width)
    } else {
        reflow_paragraphs(&text, width)
    };

    while out.last().is_some_and(|line| line.is_empty()) {
        out.pop();
    }
    out
}

pub fn replace_entities(text: &str) -> String {
    ENTITIES
        .iter()
        .fold(text.to_string(), |acc, (entity, plain)| acc.replace(entity, plain))
}

fn is_prewrapped(lines: &[&str], width: usize, ratio: f64) -> bool {
    if lines.is_empty() {
        return false;
    }
    let half = width / 2;
    let short = lines
        .iter()
        .map(|line| line.trim().width())
        .filter(|&len| len > 0 && len < half)
        .count();
    short as f64 / lines.len() as f64 > ratio
}

fn reflow_prewrapped(lines: &[&str], width: usize) -> Vec<String> {
    let mut out = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            out.push(String::new());
        } else if trimmed.width() > width {
            out.extend(wrap_text(trimmed, width));
        } else {
            out.push(trimmed.to_string());
        }
    }
    out
}

fn reflow_paragraphs(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    for paragraph in text.split("\n\n") {
        let collapsed = collapse_whitespace(paragraph);
        if collapsed.is_empty() {
            out.push(String::new());
            continue;
        }
        out.extend(wrap_text(&collapsed, width));
        out.push(String::new());
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Greedy word wrap. No produced line is wider than `width` terminal
/// columns; tokens that are wider are cut into pieces that fit.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;

    for word in text.split_whitespace() {
        let word_width = word.width();

        if word_width > width {
            if current_width > 0 {
                lines.push(std::mem::take(&mut current));
            }
            let mut pieces = split_to_width(word, width);
            let last = pieces.pop().unwrap_or_default();
            lines.extend(pieces);
            current_width = last.width();
            current = last;
            continue;
        }

        let proposed = if current_width > 0 {
            current_width + 1 + word_width
        } else {
            word_width
        };
        if proposed <= width {
            if current_width > 0 {
                current.push(' ');
            }
            current.push_str(word);
            current_width = proposed;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_width = word_width;
        }
    }

    if current_width > 0 {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Cuts `token` into pieces at most `width` columns wide. A glyph wider
/// than `width` gets a piece of its own.
fn split_to_width(token: &str, width: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();
    let mut piece_width = 0;
    for ch in token.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if piece_width + ch_width > width && !piece.is_empty() {
            pieces.push(std::mem::take(&mut piece));
            piece_width = 0;
        }
        piece.push(ch);
        piece_width += ch_width;
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROSE: &str = "The quick brown fox jumps over the lazy dog near the riverbank while \
        the sun sets slowly behind the distant hills and the evening grows cool.\n\
        It keeps running until the moon rises over the quiet valley below the \
        old stone bridge that nobody remembers building.";

    fn width_of(line: &str) -> usize {
        line.width()
    }

    #[test]
    fn lines_never_exceed_width() {
        let samples = [
            PROSE,
            "short\nlines\nof\nverse\nhere",
            "supercalifragilisticexpialidocious-and-then-some-more-characters tail",
            "",
            "\n\n\n",
            "mixed\r\nline\rendings with a fairly long sentence that must wrap somewhere sensible",
        ];
        for text in samples {
            for width in [20, 21, 33, 40, 80, 120] {
                for line in reflow(text, width, DocumentKind::Pdf) {
                    assert!(width_of(&line) <= width, "{:?} exceeds {}", line, width);
                }
            }
        }
    }

    #[test]
    fn width_is_clamped_to_minimum() {
        let lines = reflow(PROSE, 5, DocumentKind::Pdf);
        assert!(lines.iter().any(|line| width_of(line) > 5));
        assert!(lines.iter().all(|line| width_of(line) <= MIN_WIDTH));
    }

    #[test]
    fn rewrapping_a_wrapped_paragraph_is_stable() {
        let first = wrap_text(&collapse_whitespace(PROSE), 37);
        let again = wrap_text(&first.join(" "), 37);
        assert_eq!(first, again);

        let reflowed = reflow(PROSE, 60, DocumentKind::Pdf);
        let twice = reflow(&reflowed.join("\n"), 60, DocumentKind::Pdf);
        assert_eq!(reflowed, twice);
    }

    #[test]
    fn oversized_tokens_are_split() {
        let token = "x".repeat(45);
        let lines = wrap_text(&format!("a {} b", token), 20);
        assert_eq!(
            lines,
            vec![
                "a".to_string(),
                "x".repeat(20),
                "x".repeat(20),
                "xxxxx b".to_string(),
            ]
        );
    }

    #[test]
    fn wide_glyphs_count_as_two_columns() {
        // 30 ideographs, 60 columns
        let cjk = "\u{6f22}".repeat(30);
        let lines = wrap_text(&format!("{} \u{5b57}\u{5b57}", cjk), 20);
        assert_eq!(lines[0], "\u{6f22}".repeat(10));
        assert_eq!(lines[1], "\u{6f22}".repeat(10));
        assert_eq!(lines[2], "\u{6f22}".repeat(10));
        assert_eq!(lines[3], "\u{5b57}\u{5b57}");

        let mixed = "\u{65e5}\u{672c}\u{8a9e}\u{306e}\u{6587}\u{7ae0} with latin words and \u{1f600} emoji mixed into the same paragraph";
        for line in reflow(mixed, 24, DocumentKind::Pdf) {
            assert!(width_of(&line) <= 24, "{:?} is {} columns", line, width_of(&line));
        }
    }

    #[test]
    fn prose_paragraphs_are_joined_and_separated() {
        let text = "first paragraph line one that is reasonably long and keeps going on\n\
                    continues here with even more words to fill the line up nicely\n\n\
                    second paragraph also has plenty of words to avoid short line detection";
        let lines = reflow(text, 40, DocumentKind::Pdf);
        let blank_positions: Vec<_> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_empty())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(blank_positions.len(), 1);
        assert!(lines[0].starts_with("first paragraph line one"));
        assert!(lines.last().unwrap().ends_with("detection"));
    }

    #[test]
    fn verse_keeps_its_line_breaks() {
        let text = "Roses are red\nViolets are blue\n\nSugar is sweet\nAnd so are you\n\n\n";
        let lines = reflow(text, 80, DocumentKind::Pdf);
        assert_eq!(
            lines,
            vec![
                "Roses are red",
                "Violets are blue",
                "",
                "Sugar is sweet",
                "And so are you",
            ]
        );
    }

    #[test]
    fn entities_are_replaced_only_for_markup_formats() {
        let text = "Fish &amp; chips &#8212; &quot;tasty&quot;&#8230;";
        let epub = reflow(text, 80, DocumentKind::Epub);
        assert_eq!(epub, vec!["Fish & chips \u{2014} \"tasty\"...".to_string()]);

        let pdf = reflow(text, 80, DocumentKind::Pdf);
        assert_eq!(pdf, vec![text.to_string()]);
    }

    #[test]
    fn trailing_blank_lines_are_trimmed() {
        let lines = reflow("only line of text in the whole page body\n\n\n\n", 80, DocumentKind::Pdf);
        assert_eq!(lines.last().map(String::as_str), Some("only line of text in the whole page body"));
    }
}
