//! Heuristic HTML-to-snapshot reduction.
//!
//! The extractor works on raw markup with per-tag regular expressions
//! instead of a strict parser, so malformed or unclosed tags degrade
//! gracefully. Structured sections (title, headings, links, dates) are
//! read from the untouched markup; the body text goes through the
//! noise-reduction steps in [`ContentExtractor::normalize_text`].

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};

use crate::config::{ExtractorConfig, KeywordConfig};
use crate::error::ExtractionError;
use crate::relevance::RelevanceFilter;
use crate::types::{PageLink, PageSnapshot};

/// Elements removed together with their contents before text extraction.
const BLOCK_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "svg", "head", "nav", "header", "footer", "aside",
    "form",
];

lazy_static! {
    static ref COMMENT_REGEX: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();

    static ref BLOCK_REGEXES: Vec<Regex> = BLOCK_TAGS
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).unwrap())
        .collect();

    static ref VOID_META_REGEX: Regex = Regex::new(r"(?i)<(?:meta|link)\b[^>]*>").unwrap();

    // Attributes that churn between fetches without meaning anything
    static ref DYNAMIC_ATTR_REGEXES: Vec<Regex> = vec![
        Regex::new(r#"(?i)\s+id\s*=\s*"[^"]*""#).unwrap(),
        Regex::new(r#"(?i)\s+class\s*=\s*"[^"]*""#).unwrap(),
        Regex::new(r#"(?i)\s+style\s*=\s*"[^"]*""#).unwrap(),
        Regex::new(r#"(?i)\s+data-[a-z0-9\-]+\s*=\s*"[^"]*""#).unwrap(),
        Regex::new(r#"(?i)\s+data-[a-z0-9\-]+\s*=\s*'[^']*'"#).unwrap(),
        Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*"[^"]*""#).unwrap(),
    ];

    static ref TAG_REGEX: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref LONG_NUMBER_REGEX: Regex = Regex::new(r"\b\d{8,}\b").unwrap();
    static ref URL_REGEX: Regex = Regex::new(r"(?i)(?:https?://|www\.)\S+").unwrap();
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}").unwrap();
    static ref HORIZONTAL_SPACE_REGEX: Regex = Regex::new(r"[^\S\n]+").unwrap();
    static ref LINE_BREAK_REGEX: Regex = Regex::new(r"\s*\n\s*").unwrap();
    static ref ANY_SPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();

    static ref DATE_LINE_REGEX: Regex =
        Regex::new(r"^\d{1,2}[/\-.]\d{1,2}[/\-.]\d{2,4}$").unwrap();
    static ref DIGITS_LINE_REGEX: Regex = Regex::new(r"^\d+$").unwrap();
    static ref PUNCTUATION_LINE_REGEX: Regex = Regex::new(r"^[^\p{L}\p{N}]+$").unwrap();

    static ref TITLE_REGEX: Regex = Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").unwrap();
    static ref HEADING_REGEX: Regex = Regex::new(r"(?is)<h[1-3]\b[^>]*>(.*?)</h[1-3]\s*>").unwrap();
    static ref ANCHOR_REGEX: Regex = Regex::new(
        r#"(?is)<a\s+(?:[^>]*?\s+)?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a\s*>"#
    ).unwrap();
    static ref DATE_REGEX: Regex = Regex::new(
        r"\b(\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4}|\d{4}[/\-]\d{1,2}[/\-]\d{1,2})\b"
    ).unwrap();
}

/// Reduces raw page markup to a [`PageSnapshot`].
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    relevance: RelevanceFilter,
    config: ExtractorConfig,
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new(&KeywordConfig::default(), ExtractorConfig::default())
    }
}

impl ContentExtractor {
    pub fn new(keywords: &KeywordConfig, config: ExtractorConfig) -> Self {
        Self {
            relevance: RelevanceFilter::new(keywords),
            config,
        }
    }

    /// Relevance filter this extractor was built with.
    pub fn relevance(&self) -> &RelevanceFilter {
        &self.relevance
    }

    /// Extract a snapshot from raw markup.
    pub fn extract(&self, raw_html: &str) -> Result<PageSnapshot, ExtractionError> {
        if raw_html.trim().is_empty() {
            return Err(ExtractionError::EmptyDocument);
        }
        if raw_html.contains('\0') || !raw_html.contains('<') {
            return Err(ExtractionError::NotMarkup);
        }

        let links = self
            .anchors(raw_html)
            .into_iter()
            .filter(|link| self.relevance.is_relevant_link(&link.text, &link.href))
            .collect();

        Ok(PageSnapshot {
            title: extract_title(raw_html),
            headings: extract_headings(raw_html),
            links,
            dates: self.extract_dates(raw_html),
            normalized_text: self.normalize_text(raw_html),
            raw_hash: PageSnapshot::hash_content(raw_html),
        })
    }

    /// All `<a href>` anchors in document order, deduplicated by href.
    ///
    /// Anchor text has inner tags removed and whitespace collapsed.
    pub fn anchors(&self, raw_html: &str) -> Vec<PageLink> {
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for cap in ANCHOR_REGEX.captures_iter(raw_html) {
            let href = cap[1].trim();
            if href.is_empty() || !seen.insert(href.to_string()) {
                continue;
            }
            links.push(PageLink::new(href, inline_text(&cap[2])));
        }

        links
    }

    /// Date tokens with a context keyword within the configured radius.
    ///
    /// The radius counts characters on each side of the match start.
    fn extract_dates(&self, raw_html: &str) -> BTreeSet<String> {
        let radius = self.config.date_context_radius;
        let mut dates = BTreeSet::new();

        for m in DATE_REGEX.find_iter(raw_html) {
            let window = char_window(raw_html, m.start(), radius).to_lowercase();

            if self.relevance.has_date_context(&window) {
                dates.insert(m.as_str().to_string());
            }
        }

        dates
    }

    /// Reduce markup to the cleaned multi-line body text.
    pub fn normalize_text(&self, raw_html: &str) -> String {
        // Drop whole non-content elements
        let mut text = COMMENT_REGEX.replace_all(raw_html, "").into_owned();
        for regex in BLOCK_REGEXES.iter() {
            text = regex.replace_all(&text, "").into_owned();
        }
        text = VOID_META_REGEX.replace_all(&text, "").into_owned();

        // Drop attributes that change without content changing
        for regex in DYNAMIC_ATTR_REGEXES.iter() {
            text = regex.replace_all(&text, "").into_owned();
        }

        // Collapse remaining tags and strip volatile tokens
        text = TAG_REGEX.replace_all(&text, " ").into_owned();
        text = decode_entities(&text);
        text = LONG_NUMBER_REGEX.replace_all(&text, "").into_owned();
        text = URL_REGEX.replace_all(&text, "").into_owned();
        text = EMAIL_REGEX.replace_all(&text, "").into_owned();
        text = HORIZONTAL_SPACE_REGEX.replace_all(&text, " ").into_owned();
        text = LINE_BREAK_REGEX.replace_all(&text, "\n").into_owned();

        text.split('\n')
            .map(str::trim)
            .filter(|line| self.keep_line(line))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn keep_line(&self, line: &str) -> bool {
        if line.chars().count() < self.config.min_line_chars {
            return false;
        }
        if DATE_LINE_REGEX.is_match(line)
            || DIGITS_LINE_REGEX.is_match(line)
            || PUNCTUATION_LINE_REGEX.is_match(line)
        {
            return false;
        }

        let lower = line.to_lowercase();
        !self
            .config
            .boilerplate_markers
            .iter()
            .any(|marker| lower.contains(&marker.to_lowercase()))
    }
}

fn extract_title(raw_html: &str) -> String {
    TITLE_REGEX
        .captures(raw_html)
        .map(|cap| inline_text(&cap[1]))
        .unwrap_or_default()
}

fn extract_headings(raw_html: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    HEADING_REGEX
        .captures_iter(raw_html)
        .map(|cap| inline_text(&cap[1]))
        .filter(|text| !text.is_empty() && seen.insert(text.clone()))
        .collect()
}

/// Text of an inline fragment: tags removed, entities decoded, whitespace collapsed.
fn inline_text(fragment: &str) -> String {
    let text = TAG_REGEX.replace_all(fragment, " ");
    let text = decode_entities(&text);
    ANY_SPACE_REGEX.replace_all(&text, " ").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Slice of `s` spanning `radius` characters before and after byte offset `at`.
fn char_window(s: &str, at: usize, radius: usize) -> &str {
    let start = s[..at]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map_or(at, |(i, _)| i);
    let end = s[at..]
        .char_indices()
        .nth(radius)
        .map_or(s.len(), |(i, _)| at + i);
    &s[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Fundación Ejemplo &amp; Ayudas</title>
  <meta name="generator" content="cms 1.2">
  <script>var dataLayer = [{"build": 20240101123456}];</script>
</head>
<body>
  <header class="top"><nav><a href="/convocatorias">Convocatorias</a></nav></header>
  <h1>Fundación Ejemplo</h1>
  <h2 class="x">Convocatoria <b>2024</b></h2>
  <h2>Convocatoria 2024</h2>
  <div id="main" data-ts="1712345678">
    <p>Programa de becas para proyectos sociales.</p>
    <p>Plazo de solicitud hasta el 15/03/2025.</p>
    <p>Escríbenos a info@example.org o visita https://example.org/contacto</p>
    <p>12345678901</p>
    <p>---</p>
    <a href="/becas">Becas 2025</a>
    <a href="/becas">Becas otra vez</a>
    <a href="/ayudas/bases.pdf"><span>Bases</span> de la convocatoria</a>
    <a href="/quienes-somos">Quiénes somos</a>
  </div>
  <footer>Aviso legal · Cookies</footer>
</body>
</html>"#;

    fn extractor() -> ContentExtractor {
        ContentExtractor::default()
    }

    #[test]
    fn test_title_decoded_and_trimmed() {
        let snapshot = extractor().extract(PAGE).unwrap();
        assert_eq!(snapshot.title, "Fundación Ejemplo & Ayudas");
    }

    #[test]
    fn test_headings_deduplicated_in_order() {
        let snapshot = extractor().extract(PAGE).unwrap();
        assert_eq!(
            snapshot.headings,
            vec!["Fundación Ejemplo".to_string(), "Convocatoria 2024".to_string()]
        );
    }

    #[test]
    fn test_links_filtered_and_deduplicated_by_href() {
        let snapshot = extractor().extract(PAGE).unwrap();
        let hrefs: Vec<_> = snapshot.links.iter().map(|l| l.href.as_str()).collect();

        // Pre-strip markup: the nav link counts, the plain about link does not
        assert_eq!(hrefs, vec!["/convocatorias", "/becas", "/ayudas/bases.pdf"]);
        assert_eq!(snapshot.links[1].text, "Becas 2025");
        assert_eq!(snapshot.links[2].text, "Bases de la convocatoria");
    }

    #[test]
    fn test_dates_need_nearby_keyword() {
        let html = format!(
            "<p>Plazo hasta el 15/03/2025.</p>{}<p>Publicado el 01/01/2020</p>",
            "<p>Texto de relleno sin palabras clave.</p>".repeat(5)
        );
        let snapshot = extractor().extract(&html).unwrap();
        assert!(snapshot.dates.contains("15/03/2025"));
        assert!(!snapshot.dates.contains("01/01/2020"));
        assert_eq!(snapshot.dates.len(), 1);
    }

    #[test]
    fn test_iso_dates_with_context() {
        let html = "<p>Plazo de presentación: 2025-04-30</p>";
        let snapshot = extractor().extract(html).unwrap();
        assert!(snapshot.dates.contains("2025-04-30"));
    }

    #[test]
    fn test_date_context_radius() {
        let filler = "x".repeat(150);
        let html = format!("<p>plazo {filler} 10/10/2025</p>");
        let snapshot = extractor().extract(&html).unwrap();
        assert!(snapshot.dates.is_empty());

        let wide = ContentExtractor::new(
            &KeywordConfig::default(),
            ExtractorConfig::default().with_date_context_radius(200),
        );
        assert!(wide.extract(&html).unwrap().dates.contains("10/10/2025"));
    }

    #[test]
    fn test_date_window_respects_char_boundaries() {
        let html = format!("<p>{}plazo ñ 01/02/2025 ñ{}</p>", "é".repeat(80), "ü".repeat(80));
        let snapshot = extractor().extract(&html).unwrap();
        assert!(snapshot.dates.contains("01/02/2025"));
    }

    #[test]
    fn test_date_radius_counts_characters() {
        // 67 characters but 127 bytes between the keyword and the date
        let html = format!("<p>plazo {} 10/10/2025</p>", "é".repeat(60));
        let snapshot = extractor().extract(&html).unwrap();
        assert!(snapshot.dates.contains("10/10/2025"));

        assert_eq!(char_window("añoñ", 3, 1), "ño");
        assert_eq!(char_window("abc", 1, 0), "");
    }

    #[test]
    fn test_normalized_text_drops_noise() {
        let text = extractor().extract(PAGE).unwrap().normalized_text;

        assert!(text.contains("Programa de becas para proyectos sociales."));
        assert!(text.contains("Plazo de solicitud hasta el 15/03/2025."));
        assert!(!text.contains("dataLayer"));
        assert!(!text.contains("generator"));
        assert!(!text.contains("Aviso legal"));
        assert!(!text.contains("info@example.org"));
        assert!(!text.contains("https://"));
        assert!(!text.contains("12345678901"));
        assert!(!text.lines().any(|l| l == "---"));
        assert!(!text.lines().any(|l| l.trim().is_empty()));
    }

    #[test]
    fn test_dynamic_attributes_do_not_change_text() {
        let a = r#"<div id="a1" class="x" data-ts="1"><p style="color:red" onclick="go()">Becas abiertas</p></div>"#;
        let b = r#"<div id="b2" class="y" data-ts="2"><p style="color:blue" onclick="stop()">Becas abiertas</p></div>"#;

        let extractor = extractor();
        assert_eq!(extractor.normalize_text(a), extractor.normalize_text(b));
    }

    #[test]
    fn test_boilerplate_lines_dropped() {
        let html = "<p>Usamos cookies propias</p>\n<p>Ayudas a la investigación</p>\n<p>ok</p>";
        let text = extractor().normalize_text(html);
        assert_eq!(text, "Ayudas a la investigación");
    }

    #[test]
    fn test_unclosed_script_tolerated() {
        let html = "<h2>Convocatoria abierta</h2><script>var x = 1;";
        let snapshot = extractor().extract(html).unwrap();
        assert_eq!(snapshot.headings, vec!["Convocatoria abierta".to_string()]);
    }

    #[test]
    fn test_raw_hash_covers_original_markup() {
        let snapshot = extractor().extract(PAGE).unwrap();
        assert_eq!(snapshot.raw_hash, PageSnapshot::hash_content(PAGE));
        assert!(snapshot.same_content(PAGE));
    }

    #[test]
    fn test_unusable_documents() {
        let extractor = extractor();
        assert_eq!(extractor.extract("   \n"), Err(ExtractionError::EmptyDocument));
        assert_eq!(extractor.extract("plain text only"), Err(ExtractionError::NotMarkup));
        assert_eq!(extractor.extract("<p>a\0b</p>"), Err(ExtractionError::NotMarkup));
    }

    #[test]
    fn test_anchors_include_irrelevant_links() {
        let anchors = extractor().anchors(PAGE);
        assert!(anchors.iter().any(|a| a.href == "/quienes-somos"));
        assert_eq!(anchors.iter().filter(|a| a.href == "/becas").count(), 1);
    }
}
