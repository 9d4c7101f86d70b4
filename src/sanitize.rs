use std::sync::OnceLock;

use regex::Regex;

fn tag_pattern() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new("<.*?>").expect("tag pattern is valid"))
}

/// Flatten rich-text field values to plain text.
///
/// The transformation order is load-bearing: paragraph boundaries become
/// line breaks before the remaining tags are stripped, and the numeric
/// non-breaking-space entity is removed last. The tag strip is intentionally
/// naive (non-greedy "anything between angle brackets") and will over-strip
/// text containing a literal `<` that is not part of a tag; that is a known
/// limitation of the format being exported, not something to fix here.
///
/// Idempotent for any text whose entities are intact: sanitizing
/// already-sanitized text is a no-op. The one exception is an entity split
/// by markup (`&nb<x>sp;`), where stripping the tag reassembles the entity
/// and only a second pass would replace it; a single pass is kept anyway
/// because field values are sanitized exactly once on export.
pub fn sanitize(raw: &str) -> String {
    let text = raw.replace("</P><P>", "\n");
    let text = text.replace("&nbsp;", " ");
    let text = tag_pattern().replace_all(&text, "");
    text.replace("&#160;", "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraph_markers_become_line_breaks() {
        let out = sanitize("first</P><P>second</P><P>third");
        assert_eq!(out, "first\nsecond\nthird");
        assert!(!out.contains("</P><P>"));
    }

    #[test]
    fn strips_tags() {
        assert_eq!(
            sanitize("<div><b>repro</b> steps</div>"),
            "repro steps"
        );
    }

    #[test]
    fn replaces_nbsp_entities() {
        assert_eq!(sanitize("a&nbsp;b&#160;c"), "a bc");
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(sanitize("no markup here"), "no markup here");
    }

    #[test]
    fn idempotent() {
        let inputs = [
            "first</P><P>second",
            "<p>one&nbsp;two</p>&#160;",
            "plain",
            "",
            "<img src=\"x\">caption",
        ];
        for raw in inputs {
            let once = sanitize(raw);
            assert_eq!(sanitize(&once), once, "input: {raw:?}");
        }
    }

    #[test]
    fn entity_split_by_markup_survives_one_pass() {
        // Stripping the tag reassembles the entity after its replacement
        // step already ran, so it reaches the output literally. Only a
        // second pass would turn it into a space.
        let once = sanitize("&nb<x>sp;");
        assert_eq!(once, "&nbsp;");
        assert_eq!(sanitize(&once), " ");
    }

    #[test]
    fn literal_angle_bracket_over_strips() {
        // Documented limitation of the naive pattern: "a < b > c" loses the
        // middle because "< b >" looks like a tag.
        assert_eq!(sanitize("a < b > c"), "a  c");
    }

    #[test]
    fn tag_strip_does_not_cross_lines() {
        // `.` does not match a newline, so an unclosed bracket before a
        // line break survives.
        assert_eq!(sanitize("a <unclosed\nb"), "a <unclosed\nb");
    }
}
