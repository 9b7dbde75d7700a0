//! Minimal markup-to-text conversion for fetched pages.
//!
//! Block elements become lines, `<ol>` items become numbered lines and `<ul>`
//! items become bullets, so the text handler sees the same shapes it sees in
//! markdown. Script-like elements and comments are dropped entirely.

use regex::Regex;
use std::sync::OnceLock;

static TITLE_RE: OnceLock<Regex> = OnceLock::new();

fn title_re() -> &'static Regex {
    TITLE_RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").unwrap())
}

const SKIPPED: &[&str] = &["script", "style", "head", "noscript", "template", "svg", "iframe"];
const BLOCKS: &[&str] = &[
    "p", "div", "br", "tr", "section", "article", "header", "footer", "main", "table", "dt",
    "dd", "blockquote", "pre", "hr", "nav", "aside", "form", "figure", "figcaption",
];

pub struct HtmlText {
    pub title: Option<String>,
    pub text: String,
}

enum ListKind {
    Ordered(u32),
    Unordered,
}

pub fn strip_html(html: &str) -> HtmlText {
    let title = title_re()
        .captures(html)
        .map(|c| decode_entities(c[1].trim()))
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty());

    let mut out = String::new();
    let mut lists: Vec<ListKind> = Vec::new();
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        push_text(&mut out, &rest[..open]);
        rest = &rest[open..];

        if let Some(after) = rest.strip_prefix("<!--") {
            rest = match after.find("-->") {
                Some(end) => &after[end + 3..],
                None => "",
            };
            continue;
        }

        let Some(close) = rest.find('>') else {
            rest = "";
            break;
        };
        let tag = &rest[1..close];
        rest = &rest[close + 1..];

        let closing = tag.starts_with('/');
        let name: String = tag
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }

        if !closing && SKIPPED.contains(&name.as_str()) && !tag.ends_with('/') {
            rest = skip_element(rest, &name);
            continue;
        }

        match (name.as_str(), closing) {
            ("ol", false) => {
                lists.push(ListKind::Ordered(0));
                newline(&mut out);
            }
            ("ul", false) => {
                lists.push(ListKind::Unordered);
                newline(&mut out);
            }
            ("ol" | "ul", true) => {
                lists.pop();
                newline(&mut out);
            }
            ("li", false) => {
                newline(&mut out);
                let indent = "  ".repeat(lists.len().saturating_sub(1));
                out.push_str(&indent);
                match lists.last_mut() {
                    Some(ListKind::Ordered(n)) => {
                        *n += 1;
                        out.push_str(&format!("{n}. "));
                    }
                    _ => out.push_str("- "),
                }
            }
            (h, false) if is_heading(h) => {
                newline(&mut out);
                out.push('\n');
                let level = h[1..].parse::<usize>().unwrap_or(2);
                out.push_str(&"#".repeat(level));
                out.push(' ');
            }
            (h, true) if is_heading(h) => newline(&mut out),
            ("li", true) => newline(&mut out),
            (b, _) if BLOCKS.contains(&b) => newline(&mut out),
            _ => {}
        }
    }
    push_text(&mut out, rest);

    let text = out
        .lines()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    HtmlText { title, text }
}

fn is_heading(name: &str) -> bool {
    name.len() == 2 && name.starts_with('h') && matches!(name.as_bytes()[1], b'1'..=b'6')
}

/// Skip to just after `</name>`, or to the end when it never closes.
fn skip_element<'a>(rest: &'a str, name: &str) -> &'a str {
    let lower = rest.to_ascii_lowercase();
    let needle = format!("</{name}");
    match lower.find(&needle) {
        Some(start) => match rest[start..].find('>') {
            Some(end) => &rest[start + end + 1..],
            None => "",
        },
        None => "",
    }
}

fn newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn push_text(out: &mut String, raw: &str) {
    let decoded = decode_entities(raw);
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return;
    }
    let at_line_start = out.is_empty() || out.ends_with('\n') || out.ends_with(' ');
    if !at_line_start && decoded.starts_with(char::is_whitespace) {
        out.push(' ');
    }
    out.push_str(&collapsed);
    if decoded.ends_with(char::is_whitespace) {
        out.push(' ');
    }
}

pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| entity(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '-',
        "mdash" => '-',
        "hellip" => '…',
        "rsquo" | "lsquo" => '\'',
        "rdquo" | "ldquo" => '"',
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_and_headings_become_markdown_shapes() {
        let html = r#"<html><head><title>Refund  Process</title><style>p{}</style></head>
<body><h1>Refunds</h1><p>How we refund.</p>
<ol><li>Log the request <b>by Support Agent</b></li><li>Approve &amp; pay</li></ol>
<ul><li>Tip</li></ul>
<script>var x = "<li>not a step</li>";</script></body></html>"#;
        let out = strip_html(html);
        assert_eq!(out.title.as_deref(), Some("Refund Process"));
        let lines: Vec<&str> = out.text.lines().filter(|l| !l.trim().is_empty()).collect();
        assert_eq!(
            lines,
            vec![
                "# Refunds",
                "How we refund.",
                "1. Log the request by Support Agent",
                "2. Approve & pay",
                "- Tip",
            ]
        );
    }

    #[test]
    fn comments_and_unterminated_markup() {
        let out = strip_html("<p>a<!-- <li>x</li> -->b</p><p>c <unterminated");
        assert_eq!(out.text.trim(), "ab\nc");
    }

    #[test]
    fn entities() {
        assert_eq!(decode_entities("a &lt;b&gt; &#65;&#x42; &bogus; &"), "a <b> AB &bogus; &");
    }
}
