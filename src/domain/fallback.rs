//! Static sample data served by read paths when the database is unreachable.

use crate::domain::entities::CategoryRecord;
use crate::domain::taxonomy;

const FALLBACK_CATEGORY_SLUGS: &[&str] = &["programming", "tech", "life"];

/// Default categories with zero counts and localized names.
pub fn categories() -> Vec<CategoryRecord> {
    FALLBACK_CATEGORY_SLUGS
        .iter()
        .zip(1..)
        .map(|(slug, id)| CategoryRecord {
            id,
            name: taxonomy::display_name_or_slug(slug).to_string(),
            slug: (*slug).to_string(),
            description: None,
            parent_id: None,
            post_count: 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_categories_are_localized() {
        let categories = categories();
        assert_eq!(categories.len(), 3);
        assert_eq!(categories[1].slug, "tech");
        assert_eq!(categories[1].name, "技术");
        assert!(categories.iter().all(|c| c.post_count == 0));
    }
}
