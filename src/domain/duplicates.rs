//! Heuristic duplicate-article detection.
//!
//! Two posts are considered duplicates when their titles are similar enough,
//! when their slugs share a core once random suffixes are stripped, or when
//! the opening of their content is near-identical. Thresholds come from
//! [`DuplicatePolicy`].

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::entities::PostWithTaxonomy;
use crate::domain::front_matter::parse_date_prefix;

static NON_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^a-z0-9_\s\x{4e00}-\x{9fa5}]").expect("non-word regex")
});
static CJK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\x{4e00}-\x{9fa5}]").expect("cjk regex"));

const SUFFIX_MIN_LEN: usize = 4;
const SUFFIX_MAX_LEN: usize = 8;
const RECENCY_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DuplicatePolicy {
    /// Inclusive lower bound on title similarity.
    pub title_threshold: f64,
    /// Exclusive lower bound on content-prefix similarity.
    pub content_threshold: f64,
    pub content_prefix_chars: usize,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        Self {
            title_threshold: 0.8,
            content_threshold: 0.9,
            content_prefix_chars: 200,
        }
    }
}

/// A set of duplicate posts, identified by their index in the input slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub survivor: usize,
    pub removed: Vec<usize>,
}

/// Lowercase, drop punctuation, and collapse whitespace.
pub fn normalize_text(input: &str) -> String {
    let lowered = input.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Jaccard similarity over the whitespace-separated words of two strings.
pub fn similarity(left: &str, right: &str) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let left = normalize_text(left);
    let right = normalize_text(right);
    if left == right {
        return 1.0;
    }

    let left_words: HashSet<&str> = left.split(' ').filter(|w| !w.is_empty()).collect();
    let right_words: HashSet<&str> = right.split(' ').filter(|w| !w.is_empty()).collect();
    let union = left_words.union(&right_words).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = left_words.intersection(&right_words).count();
    intersection as f64 / union as f64
}

/// Split a slug into its core and a trailing run of random-looking segments.
///
/// A segment counts as random when it is 4 to 8 lowercase alphanumerics mixing
/// letters and digits, such as `a3f9c2` or `x7k2`. Plain words and years are kept.
pub fn split_random_suffix(slug: &str) -> (&str, Option<&str>) {
    let mut core_end = slug.len();

    while let Some(pos) = slug[..core_end].rfind(['-', '_']) {
        if is_random_segment(&slug[pos + 1..core_end]) {
            core_end = pos;
        } else {
            break;
        }
    }

    if core_end == slug.len() || core_end == 0 {
        (slug, None)
    } else {
        (&slug[..core_end], Some(&slug[core_end + 1..]))
    }
}

pub fn has_random_suffix(slug: &str) -> bool {
    split_random_suffix(slug).1.is_some()
}

pub fn core_slug(slug: &str) -> &str {
    split_random_suffix(slug).0
}

fn is_random_segment(segment: &str) -> bool {
    (SUFFIX_MIN_LEN..=SUFFIX_MAX_LEN).contains(&segment.len())
        && segment
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        && segment.bytes().any(|b| b.is_ascii_digit())
        && segment.bytes().any(|b| b.is_ascii_lowercase())
}

pub fn contains_cjk(text: &str) -> bool {
    CJK.is_match(text)
}

pub fn are_duplicates(
    left: &PostWithTaxonomy,
    right: &PostWithTaxonomy,
    policy: &DuplicatePolicy,
) -> bool {
    if similarity(&left.post.title, &right.post.title) >= policy.title_threshold {
        return true;
    }

    let left_core = core_slug(&left.post.slug);
    let right_core = core_slug(&right.post.slug);
    if !left_core.is_empty() && left_core == right_core {
        return true;
    }

    if left.post.content.is_empty() || right.post.content.is_empty() {
        return false;
    }
    let left_prefix: String = left
        .post
        .content
        .chars()
        .take(policy.content_prefix_chars)
        .collect();
    let right_prefix: String = right
        .post
        .content
        .chars()
        .take(policy.content_prefix_chars)
        .collect();
    similarity(&left_prefix, &right_prefix) > policy.content_threshold
}

/// Quality score used to pick the surviving post of a duplicate group.
pub fn score(candidate: &PostWithTaxonomy, now: OffsetDateTime) -> i64 {
    let post = &candidate.post;
    let mut score = 0;

    if !has_random_suffix(&post.slug) {
        score += 10;
    }
    score += (30 - post.slug.chars().count() as i64).max(0);
    score += (post.content.chars().count() as i64 / 100).min(20);
    score += candidate.categories.len() as i64 * 5;
    score += candidate.tags.len() as i64 * 2;

    if let Some(date) = parse_date_prefix(&post.date) {
        let days_ago = (now.date() - date).whole_days().max(0);
        score += (RECENCY_WINDOW_DAYS - days_ago).max(0);
    }

    if contains_cjk(&post.title) {
        score += 15;
    }

    score
}

/// Index of the highest-scoring post; ties keep the earliest.
pub fn select_best(group: &[&PostWithTaxonomy], now: OffsetDateTime) -> Option<usize> {
    let mut best: Option<(usize, i64)> = None;
    for (index, candidate) in group.iter().enumerate() {
        let candidate_score = score(candidate, now);
        if best.is_none_or(|(_, best_score)| candidate_score > best_score) {
            best = Some((index, candidate_score));
        }
    }
    best.map(|(index, _)| index)
}

/// Partition posts greedily into duplicate groups, in input order.
pub fn find_duplicate_groups(
    posts: &[PostWithTaxonomy],
    policy: &DuplicatePolicy,
    now: OffsetDateTime,
) -> Vec<DuplicateGroup> {
    let mut claimed = vec![false; posts.len()];
    let mut groups = Vec::new();

    for anchor in 0..posts.len() {
        if claimed[anchor] {
            continue;
        }

        let mut members = vec![anchor];
        for other in anchor + 1..posts.len() {
            if !claimed[other] && are_duplicates(&posts[anchor], &posts[other], policy) {
                members.push(other);
            }
        }

        if members.len() < 2 {
            continue;
        }
        for &member in &members {
            claimed[member] = true;
        }

        let refs: Vec<&PostWithTaxonomy> = members.iter().map(|&i| &posts[i]).collect();
        let survivor = members[select_best(&refs, now).unwrap_or(0)];
        let removed = members.into_iter().filter(|&i| i != survivor).collect();
        groups.push(DuplicateGroup { survivor, removed });
    }

    groups
}
