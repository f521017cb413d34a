//! Snapshot comparison.
//!
//! Turns two snapshots of the same page into a prioritized list of typed
//! change events. Structural signals (title, relevant headings, relevant
//! links, deadline dates) are reported on their own. Low textual similarity
//! is only reported alongside one of them, since page reflows and rotating
//! content make it noisy by itself.

use std::collections::HashSet;

use crate::config::{DetectorConfig, KeywordConfig};
use crate::relevance::RelevanceFilter;
use crate::similarity::similarity;
use crate::types::{Change, ChangeEvent, DetectionResult, PageLink, PageSnapshot, Priority};

/// Compares snapshots and classifies what changed.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    relevance: RelevanceFilter,
    config: DetectorConfig,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(&KeywordConfig::default(), DetectorConfig::default())
    }
}

impl ChangeDetector {
    pub fn new(keywords: &KeywordConfig, config: DetectorConfig) -> Self {
        Self {
            relevance: RelevanceFilter::new(keywords),
            config,
        }
    }

    /// Compare `old` against `new`.
    ///
    /// Identical digests return immediately without looking at any other
    /// field.
    pub fn detect(&self, old: &PageSnapshot, new: &PageSnapshot) -> DetectionResult {
        if old.raw_hash == new.raw_hash {
            return DetectionResult::unchanged();
        }

        let mut events = Vec::new();

        if old.title != new.title {
            events.push(ChangeEvent::new(
                Change::TitleChange {
                    old: old.title.clone(),
                    new: new.title.clone(),
                },
                Priority::High,
            ));
        }

        self.diff_headings(old, new, &mut events);
        diff_links(old, new, &mut events);
        diff_dates(old, new, &mut events);

        if !events.is_empty() {
            let score = similarity(&old.normalized_text, &new.normalized_text);
            if score < self.config.content_similarity_threshold {
                events.push(ChangeEvent::new(
                    Change::ContentChange {
                        similarity_percent: (score * 100.0).round() as u8,
                    },
                    Priority::Normal,
                ));
            }
        }

        DetectionResult::from_events(events)
    }

    fn diff_headings(&self, old: &PageSnapshot, new: &PageSnapshot, events: &mut Vec<ChangeEvent>) {
        let old_set: HashSet<&str> = old.headings.iter().map(String::as_str).collect();
        let new_set: HashSet<&str> = new.headings.iter().map(String::as_str).collect();

        // Document order, relevant entries only
        let added: Vec<String> = new
            .headings
            .iter()
            .filter(|h| !old_set.contains(h.as_str()))
            .filter(|h| self.relevance.is_relevant_heading(h))
            .cloned()
            .collect();
        let removed: Vec<String> = old
            .headings
            .iter()
            .filter(|h| !new_set.contains(h.as_str()))
            .filter(|h| self.relevance.is_relevant_heading(h))
            .cloned()
            .collect();

        if !added.is_empty() {
            events.push(ChangeEvent::new(
                Change::HeadingsAdded { items: added },
                Priority::High,
            ));
        }
        if !removed.is_empty() {
            events.push(ChangeEvent::new(
                Change::HeadingsRemoved { items: removed },
                Priority::High,
            ));
        }
    }
}

fn diff_links(old: &PageSnapshot, new: &PageSnapshot, events: &mut Vec<ChangeEvent>) {
    let old_hrefs: HashSet<&str> = old.links.iter().map(|l| l.href.as_str()).collect();
    let new_hrefs: HashSet<&str> = new.links.iter().map(|l| l.href.as_str()).collect();

    let added: Vec<PageLink> = new
        .links
        .iter()
        .filter(|l| !old_hrefs.contains(l.href.as_str()))
        .cloned()
        .collect();
    let removed: Vec<PageLink> = old
        .links
        .iter()
        .filter(|l| !new_hrefs.contains(l.href.as_str()))
        .cloned()
        .collect();

    if !added.is_empty() {
        events.push(ChangeEvent::new(
            Change::LinksAdded { items: added },
            Priority::High,
        ));
    }
    if !removed.is_empty() {
        events.push(ChangeEvent::new(
            Change::LinksRemoved { items: removed },
            Priority::Normal,
        ));
    }
}

fn diff_dates(old: &PageSnapshot, new: &PageSnapshot, events: &mut Vec<ChangeEvent>) {
    let added: Vec<String> = new.dates.difference(&old.dates).cloned().collect();
    let removed: Vec<String> = old.dates.difference(&new.dates).cloned().collect();

    if !added.is_empty() || !removed.is_empty() {
        events.push(ChangeEvent::new(
            Change::DatesChanged { added, removed },
            Priority::Urgent,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ContentExtractor;
    use crate::types::ChangeKind;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    const FILLER: &str = "La fundación apoya proyectos culturales y sociales en toda la región \
                          con recursos propios y alianzas con entidades públicas y privadas";

    fn page(body: &str) -> String {
        format!(
            "<html><head><title>Fundación Ejemplo</title></head><body><main>{}<p>{}</p></main></body></html>",
            body, FILLER
        )
    }

    fn snapshot(
        title: &str,
        headings: &[&str],
        links: &[(&str, &str)],
        dates: &[&str],
        text: &str,
    ) -> PageSnapshot {
        let mut snapshot = PageSnapshot {
            title: title.to_string(),
            headings: headings.iter().map(|h| h.to_string()).collect(),
            links: links.iter().map(|(h, t)| PageLink::new(*h, *t)).collect(),
            dates: dates.iter().map(|d| d.to_string()).collect::<BTreeSet<_>>(),
            normalized_text: text.to_string(),
            raw_hash: String::new(),
        };
        snapshot.raw_hash = PageSnapshot::hash_content(&format!("{:?}", snapshot));
        snapshot
    }

    fn kinds(result: &DetectionResult) -> Vec<ChangeKind> {
        result.events.iter().map(|e| e.kind()).collect()
    }

    #[test]
    fn test_identical_html_has_no_changes() {
        let extractor = ContentExtractor::default();
        let html = page("<h2>Convocatoria 2024</h2><a href=\"/becas\">Becas 2025</a>");

        let a = extractor.extract(&html).unwrap();
        let b = extractor.extract(&html).unwrap();
        let result = ChangeDetector::default().detect(&a, &b);

        assert_eq!(a.raw_hash, b.raw_hash);
        assert!(!result.has_changes);
        assert!(result.events.is_empty());
    }

    #[test]
    fn test_equal_hash_short_circuits() {
        let old = snapshot("Old", &["Convocatoria A"], &[], &["01/02/2025"], "one two");
        let mut new = snapshot("New", &["Convocatoria B"], &[], &["03/04/2025"], "three");
        new.raw_hash = old.raw_hash.clone();

        let result = ChangeDetector::default().detect(&old, &new);
        assert_eq!(result, DetectionResult::unchanged());
    }

    #[test]
    fn test_new_relevant_heading() {
        let extractor = ContentExtractor::default();
        let old = extractor
            .extract(&page("<h2>Convocatoria 2024</h2>"))
            .unwrap();
        let new = extractor
            .extract(&page(
                "<h2>Convocatoria 2024</h2><h2>Nueva Convocatoria 2025</h2>",
            ))
            .unwrap();

        let result = ChangeDetector::default().detect(&old, &new);

        assert!(result.has_changes);
        assert_eq!(result.events.len(), 1);
        assert_eq!(
            result.events[0].change,
            Change::HeadingsAdded {
                items: vec!["Nueva Convocatoria 2025".to_string()]
            }
        );
        assert_eq!(result.events[0].priority, Priority::High);
    }

    #[test]
    fn test_removed_link() {
        let extractor = ContentExtractor::default();
        let old = extractor
            .extract(&page("<p>Consulta <a href=\"/becas\">Becas 2025</a></p>"))
            .unwrap();
        let new = extractor.extract(&page("<p>Consulta</p>")).unwrap();

        let result = ChangeDetector::default().detect(&old, &new);

        assert_eq!(kinds(&result), vec![ChangeKind::LinksRemoved]);
        assert_eq!(
            result.events[0].change,
            Change::LinksRemoved {
                items: vec![PageLink::new("/becas", "Becas 2025")]
            }
        );
        assert_eq!(result.events[0].priority, Priority::Normal);
    }

    #[test]
    fn test_title_change_is_single_high_event() {
        let old = snapshot("Ayudas 2024", &[], &[], &[], "same words here");
        let new = snapshot("Ayudas 2025", &[], &[], &[], "same words here");

        let result = ChangeDetector::default().detect(&old, &new);

        assert_eq!(kinds(&result), vec![ChangeKind::TitleChange]);
        assert_eq!(result.priority(), Priority::High);
    }

    #[test]
    fn test_irrelevant_heading_churn_is_ignored() {
        let old = snapshot("T", &["Noticias", "Convocatoria abierta"], &[], &[], "a b");
        let new = snapshot("T", &["Eventos", "Convocatoria abierta"], &[], &[], "a b");

        let result = ChangeDetector::default().detect(&old, &new);

        assert!(!result.has_changes);
        assert!(result.events.is_empty());
    }

    #[test]
    fn test_links_added_priority_and_payload() {
        let old = snapshot("T", &[], &[("/becas", "Becas")], &[], "a b");
        let new = snapshot(
            "T",
            &[],
            &[("/becas", "Becas"), ("/ayudas/2025", "Ayudas 2025")],
            &[],
            "a b",
        );

        let result = ChangeDetector::default().detect(&old, &new);

        assert_eq!(
            result.events,
            vec![ChangeEvent::new(
                Change::LinksAdded {
                    items: vec![PageLink::new("/ayudas/2025", "Ayudas 2025")]
                },
                Priority::High
            )]
        );
    }

    #[test]
    fn test_dates_partition_symmetric_difference() {
        let old = snapshot("T", &[], &[], &["01/02/2025", "15/03/2025"], "a b");
        let new = snapshot("T", &[], &[], &["15/03/2025", "30/04/2025"], "a b");

        let result = ChangeDetector::default().detect(&old, &new);

        assert_eq!(
            result.events,
            vec![ChangeEvent::new(
                Change::DatesChanged {
                    added: vec!["30/04/2025".to_string()],
                    removed: vec!["01/02/2025".to_string()],
                },
                Priority::Urgent
            )]
        );
        assert_eq!(result.priority(), Priority::Urgent);
    }

    #[test]
    fn test_content_change_needs_structural_event() {
        // Completely different text, nothing structural
        let old = snapshot("T", &[], &[], &[], "alpha beta gamma");
        let new = snapshot("T", &[], &[], &[], "delta epsilon zeta");
        let result = ChangeDetector::default().detect(&old, &new);
        assert!(!result.has_changes);

        // Same rewrite with a title change corroborating it
        let new = snapshot("T2", &[], &[], &[], "delta epsilon zeta");
        let result = ChangeDetector::default().detect(&old, &new);
        assert_eq!(
            kinds(&result),
            vec![ChangeKind::TitleChange, ChangeKind::ContentChange]
        );
        assert_eq!(
            result.events[1].change,
            Change::ContentChange {
                similarity_percent: 0
            }
        );
        assert_eq!(result.events[1].priority, Priority::Normal);
    }

    #[test]
    fn test_similarity_threshold_is_configurable() {
        // {a b c d} vs {a b c e}: 3 of 5 = 0.6
        let old = snapshot("T", &[], &[], &[], "a b c d");
        let new = snapshot("T2", &[], &[], &[], "a b c e");

        let default = ChangeDetector::default().detect(&old, &new);
        assert_eq!(kinds(&default), vec![ChangeKind::TitleChange]);

        let strict = ChangeDetector::new(
            &KeywordConfig::default(),
            DetectorConfig::new().with_similarity_threshold(0.7),
        )
        .detect(&old, &new);
        assert_eq!(
            kinds(&strict),
            vec![ChangeKind::TitleChange, ChangeKind::ContentChange]
        );
        assert_eq!(
            strict.events[1].change,
            Change::ContentChange {
                similarity_percent: 60
            }
        );
    }

    #[test]
    fn test_event_order() {
        let old = snapshot(
            "Old",
            &["Convocatoria 2024"],
            &[("/a", "Becas A")],
            &["01/01/2025"],
            "a",
        );
        let new = snapshot(
            "New",
            &["Convocatoria 2025"],
            &[("/b", "Becas B")],
            &["02/02/2025"],
            "z",
        );

        let result = ChangeDetector::default().detect(&old, &new);

        assert_eq!(
            kinds(&result),
            vec![
                ChangeKind::TitleChange,
                ChangeKind::HeadingsAdded,
                ChangeKind::HeadingsRemoved,
                ChangeKind::LinksAdded,
                ChangeKind::LinksRemoved,
                ChangeKind::DatesChanged,
                ChangeKind::ContentChange,
            ]
        );
        assert_eq!(result.priority(), Priority::Urgent);
    }

    proptest! {
        #[test]
        fn prop_detect_same_page_is_noop(
            title in "[A-Za-z ]{0,20}",
            heading in "[A-Za-z ]{0,20}",
            text in "[A-Za-z0-9 ]{0,60}",
        ) {
            let html = format!(
                "<html><head><title>{}</title></head><body><h2>{}</h2><p>{}</p></body></html>",
                title, heading, text
            );
            let extractor = ContentExtractor::default();
            let a = extractor.extract(&html).unwrap();
            let b = extractor.extract(&html).unwrap();
            prop_assert!(!ChangeDetector::default().detect(&a, &b).has_changes);
        }

        #[test]
        fn prop_content_change_is_never_alone(
            old_text in "[a-e ]{0,30}",
            new_text in "[a-e ]{0,30}",
            old_title in "[ab]{0,2}",
            new_title in "[ab]{0,2}",
        ) {
            let old = snapshot(&old_title, &[], &[], &[], &old_text);
            let new = snapshot(&new_title, &[], &[], &[], &new_text);
            let result = ChangeDetector::default().detect(&old, &new);
            let only_content = result.events.len() == 1
                && result.events[0].kind() == ChangeKind::ContentChange;
            prop_assert!(!only_content);
            prop_assert_eq!(result.has_changes, !result.events.is_empty());
        }
    }
}
