//! Static mapping between English category slugs and their Chinese display names.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Category used when a post carries none and its path does not name one.
pub const UNCATEGORIZED: &str = "uncategorized";

const CATEGORY_NAMES: &[(&str, &str)] = &[
    ("tech-tools", "技术工具"),
    ("product-management", "产品管理"),
    ("family-life", "家庭生活"),
    ("insurance", "保险"),
    ("finance", "金融"),
    ("open-source", "开源"),
    ("personal-blog", "个人博客"),
    ("reading", "读书笔记"),
    ("travel", "旅行"),
    ("programming", "编程"),
    ("tech", "技术"),
    ("life", "生活"),
    (UNCATEGORIZED, "未分类"),
];

/// Legacy category slugs folded into their current equivalents on import.
const CATEGORY_ALIASES: &[(&str, &str)] = &[
    ("travel", "family-life"),
    ("reading", "family-life"),
    ("agriculture-insurance", "insurance"),
];

static BY_SLUG: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| CATEGORY_NAMES.iter().copied().collect());

/// Localized display name for a category slug.
pub fn display_name(slug: &str) -> Option<&'static str> {
    BY_SLUG.get(slug).copied()
}

/// Display name for a slug, or the slug itself when the table has no entry.
pub fn display_name_or_slug(slug: &str) -> &str {
    display_name(slug).unwrap_or(slug)
}

/// Reverse lookup from a display name to its slug; unknown names are returned unchanged.
pub fn slug_for_name(name: &str) -> &str {
    CATEGORY_NAMES
        .iter()
        .find(|(_, display)| *display == name)
        .map(|(slug, _)| *slug)
        .unwrap_or(name)
}

/// Apply the legacy alias table to a category slug.
pub fn canonical_category(slug: &str) -> &str {
    CATEGORY_ALIASES
        .iter()
        .find(|(from, _)| *from == slug)
        .map(|(_, to)| *to)
        .unwrap_or(slug)
}

/// Category named by a `content/posts/{category}/...` path, if any.
pub fn category_from_path(path: &str) -> Option<&str> {
    let mut segments = path.trim_start_matches('/').split('/');
    let root = segments.next()?;
    let posts = segments.next()?;
    let category = segments.next()?;

    // The category segment must be a directory, not the file itself.
    segments.next()?;

    (root == "content" && posts == "posts" && !category.is_empty()).then_some(category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_both_directions() {
        assert_eq!(display_name("tech-tools"), Some("技术工具"));
        assert_eq!(slug_for_name("技术工具"), "tech-tools");
        assert_eq!(display_name_or_slug("tech"), "技术");
    }

    #[test]
    fn unknown_values_pass_through() {
        assert_eq!(display_name("quantum"), None);
        assert_eq!(display_name_or_slug("quantum"), "quantum");
        assert_eq!(slug_for_name("量子"), "量子");
    }

    #[test]
    fn aliases_fold_legacy_slugs() {
        assert_eq!(canonical_category("travel"), "family-life");
        assert_eq!(canonical_category("agriculture-insurance"), "insurance");
        assert_eq!(canonical_category("finance"), "finance");
    }

    #[test]
    fn category_comes_from_third_path_segment() {
        assert_eq!(
            category_from_path("content/posts/finance/2024-01-01-budget.md"),
            Some("finance")
        );
        assert_eq!(category_from_path("content/posts/loose.md"), None);
        assert_eq!(category_from_path("docs/guide/intro.md"), None);
    }
}
