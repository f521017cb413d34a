//! Keyword relevance filter shared by extraction, detection and crawling.

use crate::config::KeywordConfig;

/// Case-insensitive keyword matcher built from a [`KeywordConfig`].
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    link_keywords: Vec<String>,
    heading_keywords: Vec<String>,
    date_context_keywords: Vec<String>,
}

impl Default for RelevanceFilter {
    fn default() -> Self {
        Self::new(&KeywordConfig::default())
    }
}

impl RelevanceFilter {
    pub fn new(config: &KeywordConfig) -> Self {
        Self {
            link_keywords: lowercase_all(&config.link_keywords),
            heading_keywords: lowercase_all(&config.heading_keywords),
            date_context_keywords: lowercase_all(&config.date_context_keywords),
        }
    }

    /// An anchor is relevant when its text or its href mentions a link keyword.
    pub fn is_relevant_link(&self, text: &str, href: &str) -> bool {
        contains_any(&text.to_lowercase(), &self.link_keywords)
            || contains_any(&href.to_lowercase(), &self.link_keywords)
    }

    /// A heading is relevant when it mentions a heading keyword.
    pub fn is_relevant_heading(&self, heading: &str) -> bool {
        contains_any(&heading.to_lowercase(), &self.heading_keywords)
    }

    /// Whether an already lowercased window of markup carries date context.
    pub fn has_date_context(&self, lowercase_window: &str) -> bool {
        contains_any(lowercase_window, &self.date_context_keywords)
    }
}

fn lowercase_all(words: &[String]) -> Vec<String> {
    words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_str()))
}
