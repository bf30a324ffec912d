// Terminal rendering: colored section output plus the small set of
// notices the interactive loop prints. Everything writes to a generic
// `Write` so the output can be captured in tests.

use crate::analysis::AnalysisResponse;
use crossterm::queue;
use crossterm::style::{
    Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor,
};
use std::io::{self, Write};
use tracing::debug;
use unicode_width::UnicodeWidthStr;

/// Print the analysis. Sections come out in table order; absent ones are
/// skipped. A reply with no recognizable heading is printed as-is.
pub fn render_analysis<W: Write>(
    out: &mut W,
    response: &AnalysisResponse,
    width: usize,
) -> io::Result<()> {
    if !response.has_sections() {
        debug!("no known headings in reply, printing raw text");
        queue!(out, Print(wrap_paragraphs(response.raw().trim(), width)), Print("\n"))?;
        return out.flush();
    }

    if let Some(preamble) = response.preamble() {
        queue!(out, Print(wrap_paragraphs(preamble, width)), Print("\n\n"))?;
    }

    for (spec, body) in response.ordered() {
        queue!(
            out,
            SetForegroundColor(spec.color),
            SetAttribute(Attribute::Bold),
            Print(format!("{}:", spec.heading)),
            SetAttribute(Attribute::Reset),
            Print("\n")
        )?;
        for line in wrap_paragraphs(body, width).lines() {
            queue!(
                out,
                SetForegroundColor(spec.color),
                Print(line),
                ResetColor,
                Print("\n")
            )?;
        }
        queue!(out, Print("\n"))?;
    }
    out.flush()
}

/// Word-wrap each line of `text` to `width` columns. Lines that already
/// fit are kept verbatim; wrapped lines keep their leading indentation on
/// every continuation. Words longer than `width` stay whole.
pub fn wrap_paragraphs(text: &str, width: usize) -> String {
    let width = width.max(1);
    let mut wrapped: Vec<String> = Vec::new();

    for paragraph in text.lines() {
        let paragraph = paragraph.trim_end();
        if paragraph.width() <= width {
            wrapped.push(paragraph.to_string());
            continue;
        }

        let words = paragraph.trim_start();
        let indent = &paragraph[..paragraph.len() - words.len()];
        let indent_width = indent.width();
        let mut line = indent.to_string();
        let mut line_width = indent_width;
        for word in words.split_whitespace() {
            let w = word.width();
            if line_width > indent_width && line_width + 1 + w > width {
                wrapped.push(std::mem::replace(&mut line, indent.to_string()));
                line_width = indent_width;
            }
            if line_width > indent_width {
                line.push(' ');
                line_width += 1;
            }
            line.push_str(word);
            line_width += w;
        }
        wrapped.push(line);
    }
    wrapped.join("\n")
}

pub fn print_banner<W: Write>(out: &mut W) -> io::Result<()> {
    queue!(
        out,
        SetBackgroundColor(Color::Blue),
        SetForegroundColor(Color::White),
        SetAttribute(Attribute::Bold),
        Print(" Welcome to the Bible Symbolism Analyzer "),
        SetAttribute(Attribute::Reset),
        ResetColor,
        Print("\n")
    )?;
    print_colored(out, Color::Cyan, "Enter 'quit' to exit")
}

/// One line of text in `color`, followed by a newline.
pub fn print_colored<W: Write>(out: &mut W, color: Color, text: &str) -> io::Result<()> {
    queue!(
        out,
        SetForegroundColor(color),
        Print(text),
        ResetColor,
        Print("\n")
    )?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::FOUR_SECTIONS;
    use pretty_assertions::assert_eq;

    fn rendered(raw: &str) -> String {
        let mut buf = Vec::new();
        render_analysis(&mut buf, &AnalysisResponse::parse(raw), 80).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn position(haystack: &str, needle: &str) -> usize {
        haystack
            .find(needle)
            .unwrap_or_else(|| panic!("{:?} not in output", needle))
    }

    #[test]
    fn wraps_long_lines_and_keeps_paragraph_breaks() {
        let text = "one two three four five\n\nsix";
        assert_eq!(wrap_paragraphs(text, 9), "one two\nthree\nfour five\n\nsix");
    }

    #[test]
    fn long_words_are_not_split() {
        assert_eq!(wrap_paragraphs("a supercalifragilistic b", 5), "a\nsupercalifragilistic\nb");
    }

    #[test]
    fn wrap_measures_display_width() {
        // each CJK char is two columns wide
        assert_eq!(wrap_paragraphs("太初 有道", 4), "太初\n有道");
    }

    #[test]
    fn short_lines_keep_indentation_and_spacing() {
        let text = "- item\n  - sub item\n    Ps 23:1   \"The Lord\"";
        assert_eq!(wrap_paragraphs(text, 80), "- item\n  - sub item\n    Ps 23:1   \"The Lord\"");
    }

    #[test]
    fn wrapped_continuations_keep_indentation() {
        assert_eq!(wrap_paragraphs("  - alpha beta gamma", 12), "  - alpha\n  beta gamma");
    }

    #[test]
    fn indented_body_lines_render_verbatim() {
        let out = rendered("KEY SYMBOLS:\n- light\n  - the first day");
        position(&out, "  - the first day");
    }

    #[test]
    fn sections_render_in_table_order() {
        let raw = "BIBLICAL CONNECTIONS:\nJohn 1:1\nKEY SYMBOLS:\nlight\nSPIRITUAL INTERPRETATION:\norder\nHISTORICAL CONTEXT:\nexile";
        let out = rendered(raw);

        let h = position(&out, "HISTORICAL CONTEXT:");
        let k = position(&out, "KEY SYMBOLS:");
        let s = position(&out, "SPIRITUAL INTERPRETATION:");
        let b = position(&out, "BIBLICAL CONNECTIONS:");
        assert!(h < k && k < s && s < b, "out of order:\n{}", out);

        assert!(position(&out, "exile") > h && position(&out, "exile") < k);
        assert!(position(&out, "John 1:1") > b);
    }

    #[test]
    fn every_body_line_is_printed() {
        let out = rendered(FOUR_SECTIONS);
        for needle in [
            "Genesis opens the Torah.",
            "- Beginning: the start of time",
            "- Heavens and earth: all of creation",
            "God is the source of all that exists.",
            "John 1:1 echoes this verse.",
        ] {
            position(&out, needle);
        }
    }

    #[test]
    fn missing_section_is_skipped() {
        let raw = "HISTORICAL CONTEXT:\na\nKEY SYMBOLS:\nb\nSPIRITUAL INTERPRETATION:\nc";
        let out = rendered(raw);
        assert!(!out.contains("BIBLICAL CONNECTIONS"));
        position(&out, "SPIRITUAL INTERPRETATION:");
    }

    #[test]
    fn unstructured_reply_is_printed_raw() {
        let out = rendered("I can only discuss scripture.");
        assert!(out.starts_with("I can only discuss scripture."));
    }
}
