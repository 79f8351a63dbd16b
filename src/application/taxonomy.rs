use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::application::repos::TaxonomyRepo;
use crate::domain::entities::CategoryRecord;
use crate::domain::{fallback, taxonomy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryView {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub post_count: i64,
}

impl From<CategoryRecord> for CategoryView {
    fn from(record: CategoryRecord) -> Self {
        let display_name = taxonomy::display_name_or_slug(&record.slug).to_string();
        Self {
            id: record.id,
            display_name: if display_name == record.slug {
                record.name.clone()
            } else {
                display_name
            },
            slug: record.slug,
            name: record.name,
            description: record.description,
            post_count: record.post_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryListing {
    pub categories: Vec<CategoryView>,
    /// Set when the database was unavailable and sample data was served.
    pub fallback: bool,
}

#[derive(Clone)]
pub struct TaxonomyService {
    repo: Arc<dyn TaxonomyRepo>,
}

impl TaxonomyService {
    pub fn new(repo: Arc<dyn TaxonomyRepo>) -> Self {
        Self { repo }
    }

    pub async fn categories(&self) -> CategoryListing {
        match self.repo.list_categories().await {
            Ok(records) => CategoryListing {
                categories: records.into_iter().map(CategoryView::from).collect(),
                fallback: false,
            },
            Err(err) => {
                warn!(
                    target = "inkbridge::taxonomy",
                    error = %err,
                    "category listing failed; serving fallback data"
                );
                CategoryListing {
                    categories: fallback::categories()
                        .into_iter()
                        .map(CategoryView::from)
                        .collect(),
                    fallback: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::application::repos::RepoError;
    use crate::domain::entities::TagRecord;

    struct BrokenRepo;

    #[async_trait]
    impl TaxonomyRepo for BrokenRepo {
        async fn list_categories(&self) -> Result<Vec<CategoryRecord>, RepoError> {
            Err(RepoError::Timeout)
        }

        async fn list_tags(&self) -> Result<Vec<TagRecord>, RepoError> {
            Err(RepoError::Timeout)
        }

        async fn recount(&self) -> Result<(), RepoError> {
            Err(RepoError::Timeout)
        }
    }

    #[tokio::test]
    async fn failed_listing_serves_fallback() {
        let service = TaxonomyService::new(Arc::new(BrokenRepo));
        let listing = service.categories().await;

        assert!(listing.fallback);
        assert_eq!(listing.categories.len(), 3);
        assert_eq!(listing.categories[0].display_name, "编程");
    }

    #[test]
    fn unknown_slug_keeps_stored_name() {
        let view = CategoryView::from(CategoryRecord {
            id: 9,
            name: "Gardening".to_string(),
            slug: "gardening".to_string(),
            description: None,
            parent_id: None,
            post_count: 2,
        });
        assert_eq!(view.display_name, "Gardening");
    }
}
