//! Result merging: noise filtering, fuzzy deduplication, subject ordering.
//!
//! Two works are duplicates when the Jaccard coefficient of their
//! normalised title+author token sets reaches the threshold. The survivor is
//! the record from the higher-priority provider, or on equal priority the
//! one with strictly more populated fields. Survivors keep first-seen order
//! and collect the external ids of everything merged into them.

use std::collections::{HashMap, HashSet};

use crate::query::normalize::{normalize_text, tokens};
use crate::types::Work;

/// Default similarity threshold.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Title fragments that mark derivative study material rather than the work.
const NOISE_PATTERNS: &[&str] = &[
    "study guide",
    "summary of",
    "sparknotes",
    "cliffsnotes",
    "workbook for",
    "analysis of",
    "quicklet on",
];

/// Whether `title` looks like a study guide, summary, or similar.
pub fn is_noise(title: &str) -> bool {
    let normalized = normalize_text(title);
    NOISE_PATTERNS.iter().any(|p| normalized.contains(p))
}

/// Jaccard coefficient of two token sets. Empty sets are never similar.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

fn identity_tokens(work: &Work) -> HashSet<String> {
    let authors: Vec<&str> = work.authors.iter().map(|a| a.name.as_str()).collect();
    tokens(&format!("{} {}", work.title, authors.join(" ")))
        .into_iter()
        .collect()
}

struct Survivor {
    work: Work,
    priority: usize,
    tokens: HashSet<String>,
}

/// Merge per-provider batches given in priority order (index 0 first).
pub fn merge(batches: Vec<Vec<Work>>, threshold: f64) -> Vec<Work> {
    let mut survivors: Vec<Survivor> = Vec::new();

    for (priority, batch) in batches.into_iter().enumerate() {
        for work in batch {
            if is_noise(&work.title) {
                tracing::trace!(title = %work.title, "noise result dropped");
                continue;
            }
            let tokens = identity_tokens(&work);
            let duplicate = survivors
                .iter_mut()
                .find(|s| jaccard(&s.tokens, &tokens) >= threshold);

            let Some(existing) = duplicate else {
                survivors.push(Survivor {
                    work,
                    priority,
                    tokens,
                });
                continue;
            };

            let replace = priority < existing.priority
                || (priority == existing.priority
                    && work.populated_fields() > existing.work.populated_fields());
            if replace {
                let dropped = std::mem::replace(&mut existing.work, work);
                absorb_ids(&mut existing.work, &dropped);
                existing.priority = priority;
                existing.tokens = tokens;
            } else {
                absorb_ids(&mut existing.work, &work);
            }
        }
    }

    survivors.into_iter().map(|s| s.work).collect()
}

/// Copy ids the survivor lacks from a dropped duplicate.
fn absorb_ids(survivor: &mut Work, dropped: &Work) {
    for (provider, id) in &dropped.external_ids {
        survivor
            .external_ids
            .entry(provider.clone())
            .or_insert_with(|| id.clone());
    }
}

/// Drop noise without fuzzy matching, for single-source results.
pub fn filter_noise(items: Vec<Work>) -> Vec<Work> {
    items.into_iter().filter(|w| !is_noise(&w.title)).collect()
}

/// Collapse works sharing a [`Work::identity_key`], keeping the first and
/// absorbing the ids of later copies. Works without a key are kept.
pub fn drop_exact_duplicates(items: Vec<Work>) -> Vec<Work> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<Work> = Vec::with_capacity(items.len());
    for work in items {
        let Some(identity) = work.identity_key() else {
            kept.push(work);
            continue;
        };
        match seen.get(&identity) {
            Some(&index) => absorb_ids(&mut kept[index], &work),
            None => {
                seen.insert(identity, kept.len());
                kept.push(work);
            }
        }
    }
    kept
}

/// Stable-sort items filed under `subject` ahead of the rest.
pub fn reorder_by_subject(items: &mut [Work], subject: &str) {
    let needle = normalize_text(subject);
    if needle.is_empty() {
        return;
    }
    items.sort_by_key(|work| {
        !work
            .categories
            .iter()
            .any(|c| normalize_text(c).contains(&needle))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Author, Edition, ProviderId};

    fn work(title: &str, author: &str, source: ProviderId) -> Work {
        Work::new(title, vec![Author::named(author)], source)
    }

    #[test]
    fn hobbit_variants_collapse() {
        let merged = merge(
            vec![
                vec![work("The Hobbit", "J.R.R. Tolkien", ProviderId::GoogleBooks)],
                vec![work("The Hobbit ", "J. R. R. Tolkien", ProviderId::OpenLibrary)],
            ],
            DEFAULT_SIMILARITY_THRESHOLD,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source, ProviderId::GoogleBooks);
    }

    #[test]
    fn distinct_works_survive() {
        let merged = merge(
            vec![
                vec![work("Dune", "Frank Herbert", ProviderId::GoogleBooks)],
                vec![work("Foundation", "Isaac Asimov", ProviderId::OpenLibrary)],
            ],
            DEFAULT_SIMILARITY_THRESHOLD,
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn same_title_different_authors_survive() {
        let merged = merge(
            vec![vec![
                work("Dune", "Frank Herbert", ProviderId::OpenLibrary),
                work("Dune", "Brian Herbert", ProviderId::OpenLibrary),
            ]],
            DEFAULT_SIMILARITY_THRESHOLD,
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn higher_priority_wins_even_when_sparser() {
        let sparse = work("Dune", "Frank Herbert", ProviderId::GoogleBooks);
        let mut rich = work("Dune", "Frank Herbert", ProviderId::OpenLibrary);
        rich.first_publication_year = Some(1965);
        rich.external_ids.insert("open_library".into(), "OL893415W".into());

        let merged = merge(vec![vec![sparse], vec![rich]], DEFAULT_SIMILARITY_THRESHOLD);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source, ProviderId::GoogleBooks);
        // The dropped record's id is kept on the survivor.
        assert_eq!(
            merged[0].external_ids.get("open_library").map(String::as_str),
            Some("OL893415W")
        );
    }

    #[test]
    fn equal_priority_prefers_more_populated_in_place() {
        let first = work("Dune", "Frank Herbert", ProviderId::OpenLibrary);
        let between = work("Foundation", "Isaac Asimov", ProviderId::OpenLibrary);
        let mut richer = work("Dune", "Frank Herbert", ProviderId::OpenLibrary);
        richer.editions.push(Edition::from_isbn("9780441172719").expect("isbn"));

        let merged = merge(vec![vec![first, between, richer]], DEFAULT_SIMILARITY_THRESHOLD);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].title, "Dune");
        assert_eq!(merged[0].editions.len(), 1);
        assert_eq!(merged[1].title, "Foundation");
    }

    #[test]
    fn equal_fields_keep_first_seen() {
        let mut a = work("Dune", "Frank Herbert", ProviderId::OpenLibrary);
        a.external_ids.insert("open_library".into(), "A".into());
        let mut b = work("Dune", "Frank Herbert", ProviderId::OpenLibrary);
        b.external_ids.insert("open_library".into(), "B".into());

        let merged = merge(vec![vec![a, b]], DEFAULT_SIMILARITY_THRESHOLD);
        assert_eq!(merged[0].external_ids["open_library"], "A");
    }

    #[test]
    fn noise_is_filtered() {
        assert!(is_noise("Study Guide: The Hobbit"));
        assert!(is_noise("Summary of Atomic Habits"));
        assert!(is_noise("SparkNotes: Dune"));
        assert!(!is_noise("The Hobbit"));

        let merged = merge(
            vec![vec![
                work("Summary of Dune", "QuickRead", ProviderId::GoogleBooks),
                work("Dune", "Frank Herbert", ProviderId::GoogleBooks),
            ]],
            DEFAULT_SIMILARITY_THRESHOLD,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(filter_noise(vec![work("Workbook for Dune", "X", ProviderId::OpenLibrary)]).len(), 0);
    }

    #[test]
    fn exact_duplicates_collapse_to_first() {
        let mut first = work("Carrie", "Stephen King", ProviderId::OpenLibrary);
        first.external_ids.insert("open_library".into(), "OL1W".into());
        let mut again = work("CARRIE", "stephen king", ProviderId::OpenLibrary);
        again.external_ids.insert("open_library".into(), "OL2W".into());
        again.external_ids.insert("goodreads".into(), "G7".into());
        let other = work("Christine", "Stephen King", ProviderId::OpenLibrary);

        let kept = drop_exact_duplicates(vec![first, again, other]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].title, "Carrie");
        assert_eq!(kept[0].external_ids["open_library"], "OL1W");
        assert_eq!(kept[0].external_ids["goodreads"], "G7");
        assert_eq!(kept[1].title, "Christine");
    }

    #[test]
    fn works_without_identity_are_kept() {
        let anonymous = || Work::new("Untitled", Vec::new(), ProviderId::OpenLibrary);
        assert_eq!(drop_exact_duplicates(vec![anonymous(), anonymous()]).len(), 2);
    }

    #[test]
    fn jaccard_bounds() {
        let a: HashSet<String> = ["dune", "frank", "herbert"].iter().map(|s| s.to_string()).collect();
        let b: HashSet<String> = ["dune", "brian", "herbert"].iter().map(|s| s.to_string()).collect();
        assert!((jaccard(&a, &a) - 1.0).abs() < f64::EPSILON);
        assert!((jaccard(&a, &b) - 0.5).abs() < f64::EPSILON);
        assert_eq!(jaccard(&a, &HashSet::new()), 0.0);
    }

    #[test]
    fn subject_matches_move_first_stably() {
        let mut a = work("A", "X", ProviderId::OpenLibrary);
        a.categories = vec!["History".into()];
        let mut b = work("B", "X", ProviderId::OpenLibrary);
        b.categories = vec!["Science Fiction, American".into()];
        let c = work("C", "X", ProviderId::OpenLibrary);
        let mut d = work("D", "X", ProviderId::GoogleBooks);
        d.categories = vec!["science fiction".into()];

        let mut items = vec![a, b, c, d];
        reorder_by_subject(&mut items, "Science Fiction");
        let titles: Vec<&str> = items.iter().map(|w| w.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "D", "A", "C"]);
    }
}
