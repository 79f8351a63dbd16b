//! Markdown front matter: tolerant parsing, normalization, and serialization.
//!
//! Parsing never fails at the [`parse_document`] level. Files whose YAML is
//! broken beyond repair are turned into a degraded record built from the
//! filename and the body, and the caller can tell the two apart through
//! [`ImportedPost::degraded`].

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use time::{Date, macros::format_description};

use crate::domain::entities::PostRecord;
use crate::domain::slug::{self, UNTITLED_SLUG};
use crate::domain::taxonomy::{self, UNCATEGORIZED};

const DELIMITER: &str = "---";
const SUMMARY_CHARS: usize = 160;
const WORDS_PER_MINUTE: usize = 200;

static QUOTED_LIST_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^(categories|tags):[ \t]*["'](.+?)["'][ \t]*$"#).expect("list field regex")
});
static TIGHT_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^(\s*[A-Za-z_][\w-]*):(["'])"#).expect("tight key regex"));
static BARE_SCALAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*[A-Za-z_][\w-]*):[ \t]+(\S.*?)[ \t]*$").expect("bare scalar regex")
});
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank run regex"));
static FILENAME_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})-").expect("filename date regex"));
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_-]").expect("separator regex"));

/// Front matter split from its Markdown body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFrontMatter {
    pub fields: Mapping,
    pub body: String,
    /// Whether the heuristics had to rewrite the YAML before it parsed.
    pub repaired: bool,
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("front matter could not be repaired: {reason}")]
pub struct RepairFailure {
    pub reason: String,
    /// Body text with the unreadable front matter removed.
    pub body: String,
}

/// Context needed to normalize a file into a post.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Base URL used to absolutize relative cover images, ending in `/`.
    pub raw_base_url: Option<String>,
    pub today: Date,
}

/// A Markdown file normalized into post fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportedPost {
    pub slug: String,
    pub title: String,
    pub date: String,
    pub updated: Option<String>,
    pub content: String,
    pub excerpt: String,
    pub description: String,
    pub published: bool,
    pub featured: bool,
    pub cover_image: Option<String>,
    pub reading_time: i64,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub original_file: String,
    pub degraded: bool,
}

impl ImportedPost {
    /// Fold legacy category slugs into their current names, keeping order and
    /// dropping duplicates introduced by the folding.
    pub fn canonicalize_categories(&mut self) {
        let mut folded: Vec<String> = Vec::with_capacity(self.categories.len());
        for category in &self.categories {
            let canonical = taxonomy::canonical_category(category).to_string();
            if !folded.contains(&canonical) {
                folded.push(canonical);
            }
        }
        self.categories = folded;
    }

    /// Date used to decide whether an incoming file is newer than the stored row.
    pub fn effective_date(&self) -> &str {
        self.updated.as_deref().unwrap_or(&self.date)
    }
}

/// Split and parse front matter, repairing common malformations when the
/// text does not parse as-is.
pub fn repair_front_matter(raw: &str) -> Result<ParsedFrontMatter, RepairFailure> {
    let text = raw.replace("\r\n", "\n");

    if !text.starts_with(DELIMITER) {
        return Ok(ParsedFrontMatter {
            fields: Mapping::new(),
            body: text,
            repaired: false,
        });
    }

    let (block, body, terminated) = split_block(&text);

    if terminated {
        if let Ok(fields) = parse_mapping(block) {
            return Ok(ParsedFrontMatter {
                fields,
                body: body.to_string(),
                repaired: false,
            });
        }
    }

    let fixed = repair_block(block);
    match parse_mapping(&fixed) {
        Ok(fields) => Ok(ParsedFrontMatter {
            fields,
            body: body.to_string(),
            repaired: true,
        }),
        Err(reason) => Err(RepairFailure {
            reason,
            body: body.trim().to_string(),
        }),
    }
}

/// Parse a Markdown document into a post, degrading instead of failing.
pub fn parse_document(path: &str, text: &str, options: &ParseOptions) -> ImportedPost {
    let directory_category = taxonomy::category_from_path(path)
        .unwrap_or(UNCATEGORIZED)
        .to_string();

    match repair_front_matter(text) {
        Ok(parsed) => normalize(path, parsed, &directory_category, options),
        Err(failure) => {
            tracing::warn!(
                target = "inkbridge::front_matter",
                path,
                reason = %failure.reason,
                "falling back to filename metadata"
            );
            degraded(path, failure.body, &directory_category, options)
        }
    }
}

/// Render a post back into Markdown with YAML front matter.
pub fn serialize_post(post: &PostRecord, categories: &[String], tags: &[String]) -> String {
    let front = SerializedFrontMatter {
        title: &post.title,
        slug: &post.slug,
        date: &post.date,
        updated: post.updated.as_deref().filter(|updated| *updated != post.date),
        categories,
        tags,
        description: (!post.description.is_empty()).then_some(post.description.as_str()),
        image: post.cover_image.as_deref(),
        featured: post.featured.then_some(true),
        published: (!post.published).then_some(false),
    };

    // Serializing plain strings and lists into YAML cannot fail.
    let yaml = serde_yaml::to_string(&front).unwrap_or_default();
    let mut document = format!("{DELIMITER}\n{yaml}{DELIMITER}\n\n{}", post.content.trim_end());
    document.push('\n');
    document
}

#[derive(Serialize)]
struct SerializedFrontMatter<'a> {
    title: &'a str,
    slug: &'a str,
    date: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated: Option<&'a str>,
    categories: &'a [String],
    tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    featured: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    published: Option<bool>,
}

/// Returns the YAML block, the body, and whether a closing delimiter was found.
fn split_block(text: &str) -> (&str, &str, bool) {
    let after_open = text[DELIMITER.len()..].trim_start_matches(['-', ' ', '\t']);
    let after_open = after_open.strip_prefix('\n').unwrap_or(after_open);

    let mut offset = 0;
    for line in after_open.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            let block = &after_open[..offset];
            let body = &after_open[offset + line.len()..];
            return (block, body.trim_start_matches('\n'), true);
        }
        offset += line.len();
    }

    // Unterminated: the block ends at the first blank line, or runs to the end.
    match after_open.find("\n\n") {
        Some(end) => (&after_open[..end], after_open[end..].trim_start_matches('\n'), false),
        None => (after_open, "", false),
    }
}

fn repair_block(block: &str) -> String {
    let fixed = QUOTED_LIST_FIELD.replace_all(block, |caps: &Captures<'_>| {
        let values = caps[2]
            .split(',')
            .map(|value| value.trim().trim_matches(['"', '\'']).trim())
            .filter(|value| !value.is_empty())
            .map(|value| format!("  - \"{}\"", escape_double_quoted(value)))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{}:\n{values}", &caps[1])
    });
    let fixed = TIGHT_KEY.replace_all(&fixed, "$1: $2");
    let fixed = BARE_SCALAR.replace_all(&fixed, |caps: &Captures<'_>| {
        let value = &caps[2];
        if value.starts_with(['"', '\'', '[', '{', '|', '>', '&', '*']) {
            caps[0].to_string()
        } else {
            format!("{}: \"{}\"", &caps[1], escape_double_quoted(value))
        }
    });
    BLANK_RUN.replace_all(&fixed, "\n\n").into_owned()
}

fn escape_double_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn parse_mapping(block: &str) -> Result<Mapping, String> {
    if block.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(block) {
        Ok(Value::Mapping(mapping)) => Ok(mapping),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(other) => Err(format!("expected a mapping, found {}", value_kind(&other))),
        Err(err) => Err(err.to_string()),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn normalize(
    path: &str,
    parsed: ParsedFrontMatter,
    directory_category: &str,
    options: &ParseOptions,
) -> ImportedPost {
    let ParsedFrontMatter { fields, body, .. } = parsed;
    let field = |key: &str| fields.get(key).and_then(scalar_string);

    let title = field("title").unwrap_or_else(|| title_from_filename(path));
    let date = field("date").unwrap_or_else(|| date_from_filename(path, options.today));
    let updated = field("updated")
        .or_else(|| field("updateDate"))
        .or_else(|| Some(date.clone()));

    let mut categories = fields.get("categories").map(string_list).unwrap_or_default();
    if categories.is_empty() {
        categories.push(directory_category.to_string());
    }
    let tags = fields.get("tags").map(string_list).unwrap_or_default();

    let description = field("description")
        .or_else(|| field("excerpt"))
        .unwrap_or_default();
    let excerpt = if description.is_empty() {
        summarize(&body)
    } else {
        description.clone()
    };

    let slug = field("slug")
        .and_then(|explicit| slug::derive_slug(&explicit).ok())
        .unwrap_or_else(|| slug_for(&title, path));

    let cover_image = field("image")
        .or_else(|| field("coverImage"))
        .map(|image| absolutize_image(&image, options.raw_base_url.as_deref()));

    ImportedPost {
        slug,
        title,
        date,
        updated,
        reading_time: reading_time(&body),
        content: body,
        excerpt,
        description,
        published: fields.get("published").is_none_or(|value| !is_false(value)),
        featured: fields.get("featured").is_some_and(is_true),
        cover_image,
        categories,
        tags,
        original_file: path.to_string(),
        degraded: false,
    }
}

fn degraded(
    path: &str,
    body: String,
    directory_category: &str,
    options: &ParseOptions,
) -> ImportedPost {
    let title = title_from_filename(path);
    let date = date_from_filename(path, options.today);
    let description = summarize(&body);

    ImportedPost {
        slug: slug_for(&title, path),
        updated: Some(date.clone()),
        date,
        title,
        reading_time: reading_time(&body),
        excerpt: description.clone(),
        description,
        content: body,
        published: true,
        featured: false,
        cover_image: None,
        categories: vec![directory_category.to_string()],
        tags: Vec::new(),
        original_file: path.to_string(),
        degraded: true,
    }
}

fn slug_for(title: &str, path: &str) -> String {
    slug::derive_slug(title)
        .ok()
        .or_else(|| slug::slug_from_filename(path))
        .unwrap_or_else(|| UNTITLED_SLUG.to_string())
}

fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.strip_suffix(".md").unwrap_or(name)
}

/// Title derived from a filename: date prefix removed, separators turned into
/// spaces, first letter capitalized.
pub fn title_from_filename(path: &str) -> String {
    let stem = slug::strip_date_prefix(file_stem(path));
    let spaced = SEPARATORS.replace_all(stem, " ");
    let mut chars = spaced.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Untitled".to_string(),
    }
}

fn date_from_filename(path: &str, today: Date) -> String {
    FILENAME_DATE
        .captures(file_stem(path))
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| format_date(today))
}

pub fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

/// Parse the leading `YYYY-MM-DD` of a front-matter date.
pub fn parse_date_prefix(value: &str) -> Option<Date> {
    let prefix = value.get(..10)?;
    Date::parse(prefix, format_description!("[year]-[month]-[day]")).ok()
}

/// First characters of the body on one line, used as an excerpt.
pub fn summarize(body: &str) -> String {
    let head: String = body.trim().chars().take(SUMMARY_CHARS).collect();
    format!("{}...", head.replace('\n', " "))
}

/// Minutes to read at 200 words per minute, at least one.
pub fn reading_time(body: &str) -> i64 {
    let words = body.split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE).max(1) as i64
}

fn absolutize_image(image: &str, raw_base_url: Option<&str>) -> String {
    let is_absolute = image.starts_with("http://")
        || image.starts_with("https://")
        || image.starts_with("//")
        || image.starts_with("data:");
    match raw_base_url {
        Some(base) if !is_absolute => format!("{base}{}", image.trim_start_matches('/')),
        _ => image.to_string(),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Tagged(tagged) => return scalar_string(&tagged.value),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn string_list(value: &Value) -> Vec<String> {
    let items = match value {
        Value::Sequence(items) => items.iter().filter_map(scalar_string).collect(),
        other => scalar_string(other).into_iter().collect::<Vec<_>>(),
    };
    items.into_iter().filter(|item| item != "true").collect()
}

fn is_false(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => !flag,
        Value::String(text) => text.trim().eq_ignore_ascii_case("false"),
        _ => false,
    }
}

fn is_true(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => text.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;

    fn options() -> ParseOptions {
        ParseOptions {
            raw_base_url: Some("https://raw.githubusercontent.com/me/blog/main/".to_string()),
            today: date!(2025 - 05 - 17),
        }
    }

    #[test]
    fn parses_valid_front_matter_without_repair() {
        let text = "---\ntitle: Hello\ndate: 2024-01-02\ncategories:\n  - finance\ntags: [rust, sync]\n---\n\nBody text here.\n";
        let parsed = repair_front_matter(text).expect("parse");
        assert!(!parsed.repaired);
        assert_eq!(parsed.body, "Body text here.\n");

        let post = parse_document("content/posts/finance/hello.md", text, &options());
        assert_eq!(post.title, "Hello");
        assert_eq!(post.date, "2024-01-02");
        assert_eq!(post.categories, vec!["finance"]);
        assert_eq!(post.tags, vec!["rust", "sync"]);
        assert_eq!(post.slug, "hello");
        assert!(post.published);
        assert!(!post.degraded);
    }

    #[test]
    fn quoted_scalar_categories_become_lists() {
        let text = "---\ntitle: Notes\ncategories: \"tech-tools\"\ntags: 'rust, yaml'\n---\nbody";
        let post = parse_document("content/posts/misc/notes.md", text, &options());
        assert_eq!(post.categories, vec!["tech-tools"]);
        assert_eq!(post.tags, vec!["rust, yaml"]);
    }

    #[test]
    fn repairs_bare_values_with_colons() {
        let text = "---\ntitle: Rust: the good parts\ndate: 2024-02-03\ncategories: \"finance\"\n---\nBody";
        let parsed = repair_front_matter(text).expect("repaired");
        assert!(parsed.repaired);
        assert_eq!(
            parsed.fields.get("title").and_then(scalar_string).as_deref(),
            Some("Rust: the good parts")
        );
        let categories = parsed.fields.get("categories").map(string_list);
        assert_eq!(categories, Some(vec!["finance".to_string()]));
    }

    #[test]
    fn unterminated_front_matter_closes_at_first_blank_line() {
        let text = "---\ntitle: Open ended\ndate: 2024-03-04\n\nThe body starts here.";
        let parsed = repair_front_matter(text).expect("repaired");
        assert_eq!(
            parsed.fields.get("title").and_then(scalar_string).as_deref(),
            Some("Open ended")
        );
        assert_eq!(parsed.body, "The body starts here.");
    }

    #[test]
    fn degrades_to_filename_metadata_when_yaml_is_hopeless() {
        let text = "---\ntitle: [unclosed\n  - : : :\n---\nSome body\nwith lines.";
        let post = parse_document(
            "content/posts/finance/2023-07-08-my_budget-plan.md",
            text,
            &options(),
        );
        assert!(post.degraded);
        assert_eq!(post.title, "My budget plan");
        assert_eq!(post.date, "2023-07-08");
        assert_eq!(post.categories, vec!["finance"]);
        assert!(post.tags.is_empty());
        assert!(post.published);
        assert_eq!(post.description, "Some body with lines....");
    }

    #[test]
    fn missing_date_uses_today() {
        let post = parse_document("content/posts/tech/untitled.md", "no front matter", &options());
        assert_eq!(post.date, "2025-05-17");
        assert_eq!(post.title, "Untitled");
        assert_eq!(post.categories, vec!["tech"]);
    }

    #[test]
    fn published_is_true_unless_explicitly_false() {
        let draft = parse_document(
            "content/posts/tech/a.md",
            "---\ntitle: A\npublished: false\n---\nx",
            &options(),
        );
        assert!(!draft.published);

        let quoted = parse_document(
            "content/posts/tech/b.md",
            "---\ntitle: B\npublished: \"false\"\n---\nx",
            &options(),
        );
        assert!(!quoted.published);

        let other = parse_document(
            "content/posts/tech/c.md",
            "---\ntitle: C\npublished: maybe\n---\nx",
            &options(),
        );
        assert!(other.published);
    }

    #[test]
    fn filters_placeholder_values_and_falls_back_to_directory() {
        let text = "---\ntitle: T\ncategories: [\"true\", \"\"]\ntags: true\n---\nx";
        let post = parse_document("content/posts/insurance/t.md", text, &options());
        assert_eq!(post.categories, vec!["insurance"]);
        assert!(post.tags.is_empty());
    }

    #[test]
    fn derives_excerpt_reading_time_and_cover_image() {
        let body = "word ".repeat(450);
        let text = format!("---\ntitle: Long read\nimage: /images/cover.png\n---\n{body}");
        let post = parse_document("content/posts/tech/long.md", &text, &options());
        assert_eq!(post.reading_time, 3);
        assert!(post.excerpt.ends_with("..."));
        assert_eq!(
            post.cover_image.as_deref(),
            Some("https://raw.githubusercontent.com/me/blog/main/images/cover.png")
        );
    }

    #[test]
    fn chinese_titles_get_transliterated_slugs() {
        let text = "---\ntitle: 测试文章\ncategories: tech\n---\n内容";
        let post = parse_document("content/posts/tech/x.md", text, &options());
        assert_eq!(post.slug, "ce-shi-wen-zhang");
        assert_eq!(post.categories, vec!["tech"]);
    }

    #[test]
    fn canonicalize_folds_aliases() {
        let text = "---\ntitle: Trip\ncategories: [travel, reading, finance]\n---\nx";
        let mut post = parse_document("content/posts/travel/trip.md", text, &options());
        post.canonicalize_categories();
        assert_eq!(post.categories, vec!["family-life", "finance"]);
    }

    #[test]
    fn serialization_round_trips_core_fields() {
        let now = OffsetDateTime::now_utc();
        let record = PostRecord {
            id: Uuid::new_v4(),
            slug: "round-trip".to_string(),
            title: "Round: trip \"quoted\"".to_string(),
            date: "2024-05-06".to_string(),
            updated: Some("2024-05-07".to_string()),
            content: "# Heading\n\nBody.".to_string(),
            excerpt: String::new(),
            description: "Desc".to_string(),
            published: false,
            featured: false,
            cover_image: None,
            reading_time: 1,
            original_file: None,
            created_at: now,
            updated_at: now,
        };
        let categories = vec!["tech-tools".to_string(), "finance".to_string()];
        let tags = vec!["rust".to_string(), "2024".to_string()];

        let text = serialize_post(&record, &categories, &tags);
        let parsed = parse_document("content/posts/tech-tools/round-trip.md", &text, &options());

        assert_eq!(parsed.title, record.title);
        assert_eq!(parsed.date, record.date);
        assert_eq!(parsed.updated.as_deref(), Some("2024-05-07"));
        assert_eq!(parsed.categories, categories);
        assert_eq!(parsed.tags, tags);
        assert_eq!(parsed.slug, "round-trip");
        assert!(!parsed.published);
        assert_eq!(parsed.content, "# Heading\n\nBody.\n");
    }

    #[test]
    fn parses_date_prefix() {
        assert_eq!(parse_date_prefix("2024-05-06T10:00:00Z"), Some(date!(2024 - 05 - 06)));
        assert_eq!(parse_date_prefix("May 6"), None);
    }
}
