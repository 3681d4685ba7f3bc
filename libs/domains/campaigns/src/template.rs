//! `{{field}}` substitution for campaign subjects and bodies.
//!
//! A token is `{{`, one or more characters other than braces, then `}}`.
//! Names match exactly, including case and surrounding spaces. Anything that
//! does not form a token (`{{name`, `name}}`, `{{}}`) is copied through.

use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}]+)\}\}").unwrap());

static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

static BLOCK_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(p|div|h[1-6]|li|tr|ul|ol|table|blockquote)\s*>").unwrap()
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

static INLINE_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());

static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Substitute every token with its value from `row`, or `[field]` when the
/// row has no such field.
pub fn render(template: &str, row: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let field = &caps[1];
            match row.get(field) {
                Some(value) => value.clone(),
                None => format!("[{}]", field),
            }
        })
        .into_owned()
}

/// Field names referenced by `template`, in order of first appearance.
pub fn template_fields(template: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    PLACEHOLDER
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .filter(|field| seen.insert(field.clone()))
        .collect()
}

/// Fields `template` references that are not in `known`.
pub fn find_undeclared_fields(template: &str, known: &HashSet<String>) -> Vec<String> {
    template_fields(template)
        .into_iter()
        .filter(|field| !known.contains(field))
        .collect()
}

/// Plain-text alternative for an HTML body.
pub fn html_to_text(html: &str) -> String {
    let text = LINE_BREAK.replace_all(html, "\n");
    let text = BLOCK_END.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, "");
    let text = decode_entities(&text);

    let lines: Vec<String> = text
        .lines()
        .map(|line| INLINE_SPACE.replace_all(line, " ").trim().to_string())
        .collect();
    let text = lines.join("\n");

    BLANK_RUN.replace_all(&text, "\n\n").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    // `&amp;` last so `&amp;lt;` stays `&lt;`
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn known(fields: &[&str]) -> HashSet<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_missing_field_is_visible() {
        assert_eq!(render("Hi {{name}}", &HashMap::new()), "Hi [name]");
    }

    #[test]
    fn test_substitutes_every_occurrence() {
        let values = row(&[("name", "Ada"), ("company", "Acme")]);
        assert_eq!(
            render("{{name}} at {{company}}, hello {{name}}!", &values),
            "Ada at Acme, hello Ada!"
        );
    }

    #[test]
    fn test_names_are_exact() {
        let values = row(&[("name", "Ada")]);
        assert_eq!(render("{{Name}}", &values), "[Name]");
        assert_eq!(render("{{ name }}", &values), "[ name ]");
    }

    #[test]
    fn test_malformed_tokens_left_verbatim() {
        let values = row(&[("name", "Ada")]);
        assert_eq!(render("{{name", &values), "{{name");
        assert_eq!(render("name}}", &values), "name}}");
        assert_eq!(render("{{}}", &values), "{{}}");
        assert_eq!(render("{{{name}}}", &values), "{Ada}");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let values = row(&[("name", "{{email}}")]);
        assert_eq!(render("Hi {{name}}", &values), "Hi {{email}}");
    }

    #[test]
    fn test_fully_declared_template_renders_without_tokens() {
        let template = "Dear {{name}}, your code is {{code}}. {{name}}";
        let values = row(&[("name", "Ada"), ("code", "X1")]);

        assert!(find_undeclared_fields(template, &known(&["name", "code"])).is_empty());
        assert!(!render(template, &values).contains("{{"));
    }

    #[test]
    fn test_undeclared_fields_ordered_and_deduplicated() {
        let template = "{{b}} {{a}} {{name}} {{b}} {{c}}";
        assert_eq!(
            find_undeclared_fields(template, &known(&["name"])),
            vec!["b", "a", "c"]
        );
        assert_eq!(template_fields("no tokens"), Vec::<String>::new());
    }

    #[test]
    fn test_html_to_text() {
        let html = "<h1>Hello&nbsp;Ada</h1><p>Line one<br/>Line   two</p>\n\n\n<div>Tom &amp; Jerry &lt;3</div>";
        assert_eq!(
            html_to_text(html),
            "Hello Ada\nLine one\nLine two\n\nTom & Jerry <3"
        );
    }

    #[test]
    fn test_html_to_text_plain_input() {
        assert_eq!(html_to_text("just text"), "just text");
        assert_eq!(html_to_text(""), "");
    }
}
