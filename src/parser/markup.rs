use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>").unwrap()
});
static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b[^>]*>|</a\s*>").unwrap());

/// Remove every markup tag, keeping line structure. Scripts, styles and
/// comments go with their content; common entities are decoded.
pub fn strip_tags(html: &str) -> String {
    let text = COMMENT_RE.replace_all(html, "");
    let text = SCRIPT_RE.replace_all(&text, "");
    let text = TAG_RE.replace_all(&text, "");
    decode_entities(&text)
}

/// Remove hyperlink anchors but keep their text.
pub fn strip_anchors(html: &str) -> String {
    ANCHOR_RE.replace_all(html, "").into_owned()
}

pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Byte offset of the next `<name` opening tag at or after `from`.
/// `lower` must be the ASCII-lowercased haystack, `name` lowercase.
/// The name must end at `>`, `/` or whitespace so `<tr` never matches `<track`.
pub fn find_open(lower: &str, name: &str, from: usize) -> Option<usize> {
    let needle = format!("<{}", name);
    let mut at = from;
    while let Some(rel) = lower.get(at..)?.find(&needle) {
        let pos = at + rel;
        match lower.as_bytes().get(pos + needle.len()) {
            Some(b) if *b == b'>' || *b == b'/' || b.is_ascii_whitespace() => return Some(pos),
            None => return None,
            _ => at = pos + needle.len(),
        }
    }
    None
}

/// Byte offset of the next `</name` closing tag at or after `from`.
pub fn find_close(lower: &str, name: &str, from: usize) -> Option<usize> {
    let needle = format!("</{}", name);
    Some(lower.get(from..)?.find(&needle)? + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_keeps_lines() {
        let html = "<tr>\n<td>Kingdom:</td>\n<td><a href=\"/wiki/Bacteria\">Bacteria</a></td>\n</tr>";
        assert_eq!(strip_tags(html), "\nKingdom:\nBacteria\n");
    }

    #[test]
    fn drops_scripts_and_comments() {
        let html = "a<script type=\"x\">var s = '<b>';</script>b<!-- <td>hidden</td> -->c";
        assert_eq!(strip_tags(html), "abc");
    }

    #[test]
    fn decodes_entities_once() {
        assert_eq!(decode_entities("A&nbsp;&amp;&lt;B&gt;"), "A &<B>");
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
    }

    #[test]
    fn anchors_removed_text_kept() {
        assert_eq!(
            strip_anchors("<td><A HREF=\"x.php\" target=_blank>Name</A></td>"),
            "<td>Name</td>"
        );
    }

    #[test]
    fn open_tag_boundaries() {
        let s = "<track><tr class=x><tr>";
        assert_eq!(find_open(s, "tr", 0), Some(7));
        assert_eq!(find_open(s, "tr", 8), Some(19));
        assert_eq!(find_open(s, "tr", 20), None);
        assert_eq!(find_open("<tr", "tr", 0), None);
    }
}
