//! Slug derivation for posts, categories, and tags.
//!
//! ASCII slugification comes from the `slug` crate and Chinese titles are
//! transliterated with `pinyin` first, so “测试文章” becomes `ce-shi-wen-zhang`.
//! Uniqueness is delegated to a caller-supplied predicate to keep this module
//! free of persistence concerns.

use std::future::Future;
use std::path::Path;

use once_cell::sync::Lazy;
use pinyin::{Pinyin, ToPinyin};
use regex::Regex;
use slug::slugify;
use thiserror::Error;
use uuid::Uuid;

/// Longest slug produced from a title.
pub const MAX_SLUG_LEN: usize = 80;
/// Slug used when neither the title nor the filename yields anything usable.
pub const UNTITLED_SLUG: &str = "untitled-post";

const MAX_SUFFIX_ATTEMPTS: usize = 100;
const RANDOM_SUFFIX_LEN: usize = 6;

static DATE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}-").expect("date prefix regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

#[derive(Debug, Error)]
pub enum SlugAsyncError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Predicate(E),
}

/// Derive a slug of at most [`MAX_SLUG_LEN`] characters from human-readable text.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let transliterated = transliterate_to_ascii(input);
    let candidate = truncate_slug(&slugify(&transliterated), MAX_SLUG_LEN);

    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Slug derived from a Markdown filename with its `YYYY-MM-DD-` prefix removed.
pub fn slug_from_filename(path: &str) -> Option<String> {
    let stem = Path::new(path).file_stem()?.to_str()?;
    let stripped = DATE_PREFIX.replace(stem, "");
    derive_slug(&stripped).ok()
}

/// Strip a leading `YYYY-MM-DD-` prefix from a filename stem.
pub fn strip_date_prefix(stem: &str) -> &str {
    match DATE_PREFIX.find(stem) {
        Some(found) => &stem[found.end()..],
        None => stem,
    }
}

/// Short lowercase alphanumeric suffix used when counter suffixes run out.
pub fn random_suffix() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(RANDOM_SUFFIX_LEN)
        .collect()
}

/// Produce a slug that the awaited predicate accepts as unique.
///
/// Candidates are tried in order: `base`, `base-1`, `base-2`, … and, once the
/// counter is exhausted, `base-<random>`.
pub async fn ensure_unique_slug_async<F, Fut, E>(
    base: &str,
    mut is_unique: F,
) -> Result<String, SlugAsyncError<E>>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    if base.is_empty() {
        return Err(SlugAsyncError::Slug(SlugError::EmptyInput));
    }

    for candidate in candidates(base) {
        if is_unique(&candidate)
            .await
            .map_err(SlugAsyncError::Predicate)?
        {
            return Ok(candidate);
        }
    }

    Err(SlugAsyncError::Slug(SlugError::Exhausted {
        base: base.to_string(),
    }))
}

fn candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string())
        .chain((1..=MAX_SUFFIX_ATTEMPTS).map(move |attempt| format!("{base}-{attempt}")))
        .chain(std::iter::once_with(move || {
            format!("{base}-{}", random_suffix())
        }))
}

fn truncate_slug(slug: &str, max_len: usize) -> String {
    if slug.len() <= max_len {
        return slug.to_string();
    }
    // slugify output is ASCII, so byte slicing is safe.
    slug[..max_len].trim_end_matches('-').to_string()
}

fn transliterate_to_ascii(input: &str) -> String {
    let mut output = String::with_capacity(input.len());

    for ch in input.chars() {
        if ch.is_ascii() {
            output.push(ch);
            continue;
        }

        match ch.to_pinyin() {
            Some(py) => append_pinyin(&mut output, py),
            None if ch.is_whitespace() => output.push(' '),
            None => output.push(ch),
        }
    }

    output
}

fn append_pinyin(buffer: &mut String, pinyin: Pinyin) {
    if !buffer.is_empty() && !buffer.ends_with(' ') {
        buffer.push(' ');
    }
    buffer.push_str(pinyin.plain());
}
