use std::fmt::Write as _;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::model::{Definition, TermFile, TermRecord};
use crate::normalize::{normalize, sort_definitions};
use crate::DictionaryError;

// Unreserved URL characters pass through; everything else is escaped.
const SHARE_ENCODE: &AsciiSet =
    &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

const REQUIRED_PLACEHOLDERS: [&str; 2] = ["{{TERM}}", "{{DEFINITIONS}}"];

/// Page skeleton with `{{PLACEHOLDER}}` slots.
///
/// Recognized slots: `TERM`, `SLUG`, `DESCRIPTION`, `DEFINITIONS`,
/// `DEFINITION_COUNT`, `RELATED`, `SHARE_URL`, `SHARE_LINKS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTemplate {
    source: String,
}

impl PageTemplate {
    /// # Errors
    /// Returns [`DictionaryError::Parse`] when a required slot is missing.
    pub fn new(source: impl Into<String>) -> Result<Self, DictionaryError> {
        let source = source.into();
        for placeholder in REQUIRED_PLACEHOLDERS {
            if !source.contains(placeholder) {
                return Err(DictionaryError::Parse(format!(
                    "page template is missing the {placeholder} placeholder"
                )));
            }
        }
        Ok(Self { source })
    }
}

#[derive(Debug, Clone)]
pub struct PageRenderer {
    template: PageTemplate,
    base_url: String,
}

impl PageRenderer {
    #[must_use]
    pub fn new(template: PageTemplate, base_url: &str) -> Self {
        Self { template, base_url: base_url.trim_end_matches('/').to_string() }
    }

    /// Normalize, sort, and render one term file.
    ///
    /// # Errors
    /// Returns [`DictionaryError::EmptyDefinitions`] when the file resolves to
    /// zero definitions.
    pub fn render(&self, file: &TermFile) -> Result<String, DictionaryError> {
        self.render_record(&normalize(file))
    }

    /// Render an already-normalized record published as `<slug>.html`.
    ///
    /// # Errors
    /// Returns [`DictionaryError::EmptyDefinitions`] for a record without definitions.
    pub fn render_record(&self, record: &TermRecord) -> Result<String, DictionaryError> {
        self.render_page(record, &record.slug)
    }

    /// Render a record published as `<page>.html`; share links point there.
    /// Output depends only on the record, the page name and the template.
    ///
    /// # Errors
    /// Returns [`DictionaryError::EmptyDefinitions`] for a record without definitions.
    pub fn render_page(&self, record: &TermRecord, page: &str) -> Result<String, DictionaryError> {
        if record.definitions.is_empty() {
            return Err(DictionaryError::EmptyDefinitions { term: record.term.clone() });
        }

        let mut definitions = record.definitions.clone();
        sort_definitions(&mut definitions);

        let mut fragments = String::new();
        for (index, definition) in definitions.iter().enumerate() {
            fragments.push_str(&definition_fragment(definition, index + 1));
        }

        let share_url = self.share_url(page);
        let description = definitions.first().map_or("", |top| top.definition.as_str());

        let page = self
            .template
            .source
            .replace("{{TERM}}", &escape_html(&record.term))
            .replace("{{SLUG}}", &escape_html(&record.slug))
            .replace("{{DESCRIPTION}}", &escape_html(description))
            .replace("{{DEFINITION_COUNT}}", &definitions.len().to_string())
            .replace("{{RELATED}}", &related_fragment(&record.related))
            .replace("{{SHARE_URL}}", &escape_html(&share_url))
            .replace("{{SHARE_LINKS}}", &share_fragment(&record.term, &share_url))
            .replace("{{DEFINITIONS}}", &fragments);
        Ok(page)
    }

    fn share_url(&self, page: &str) -> String {
        format!("{}/terms/{page}.html", self.base_url)
    }
}

fn definition_fragment(definition: &Definition, rank: usize) -> String {
    let id = escape_html(&definition.id);
    let mut html = String::new();
    let primary = if definition.is_primary { " primary" } else { "" };
    let _ = writeln!(
        html,
        r#"<article class="definition{primary}" data-definition-id="{id}" data-rank="{rank}">"#
    );
    let _ = writeln!(
        html,
        r#"  <p class="definition-text">{}</p>"#,
        escape_html(&definition.definition)
    );
    if !definition.usage.trim().is_empty() {
        let _ = writeln!(
            html,
            r#"  <p class="definition-usage">&ldquo;{}&rdquo;</p>"#,
            escape_html(&definition.usage)
        );
    }
    match (&definition.author, &definition.date) {
        (Some(author), Some(date)) => {
            let _ = writeln!(
                html,
                r#"  <p class="definition-meta">by {} on {}</p>"#,
                escape_html(author),
                escape_html(date)
            );
        }
        (Some(author), None) => {
            let _ =
                writeln!(html, r#"  <p class="definition-meta">by {}</p>"#, escape_html(author));
        }
        (None, Some(date)) => {
            let _ = writeln!(html, r#"  <p class="definition-meta">{}</p>"#, escape_html(date));
        }
        (None, None) => {}
    }
    let _ = writeln!(html, r#"  <div class="vote-controls">"#);
    let _ = writeln!(
        html,
        r#"    <button class="vote-button up" data-action="vote-up" data-definition-id="{id}" aria-label="Upvote">&#9650;</button>"#
    );
    let _ = writeln!(
        html,
        r#"    <span class="vote-score" data-score-for="{id}">{}</span>"#,
        definition.net_score
    );
    let _ = writeln!(
        html,
        r#"    <button class="vote-button down" data-action="vote-down" data-definition-id="{id}" aria-label="Downvote">&#9660;</button>"#
    );
    let _ = writeln!(html, "  </div>");
    let _ = writeln!(html, "</article>");
    html
}

fn related_fragment(related: &[String]) -> String {
    if related.is_empty() {
        return String::new();
    }
    let mut html = String::from("<ul class=\"related-tags\">\n");
    for tag in related {
        let _ = writeln!(html, r#"  <li class="tag">{}</li>"#, escape_html(tag));
    }
    html.push_str("</ul>\n");
    html
}

fn share_fragment(term: &str, share_url: &str) -> String {
    let text = percent_encode(&format!("\"{term}\" on the Floundermode Dictionary"));
    let url = percent_encode(share_url);
    let mut html = String::from("<div class=\"share-links\">\n");
    let _ = writeln!(
        html,
        r#"  <a class="share twitter" href="https://twitter.com/intent/tweet?text={text}&amp;url={url}" target="_blank" rel="noopener">Share</a>"#
    );
    let _ = writeln!(
        html,
        r#"  <a class="share linkedin" href="https://www.linkedin.com/sharing/share-offsite/?url={url}" target="_blank" rel="noopener">Post</a>"#
    );
    let _ = writeln!(
        html,
        r#"  <button class="share copy" data-action="copy-link" data-url="{}">Copy link</button>"#,
        escape_html(share_url)
    );
    html.push_str("</div>\n");
    html
}

pub(crate) fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '{' => escaped.push_str("&#123;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, SHARE_ENCODE).to_string()
}
