use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::dto::{CategoryResponse, Page, ProductListQuery, ProductResponse};
use crate::errors::AppError;
use crate::models::Product;
use crate::store::{CatalogStore, ProductFilter};

/// Searches return at most this many products, whatever the page size.
pub const SEARCH_RESULT_LIMIT: usize = 5;
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductSort {
    PriceLowHigh,
    PriceHighLow,
    Rating,
    Newest,
    Featured,
}

impl ProductSort {
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some("price-low-high") => ProductSort::PriceLowHigh,
            Some("price-high-low") => ProductSort::PriceHighLow,
            Some("rating") => ProductSort::Rating,
            Some("newest") => ProductSort::Newest,
            _ => ProductSort::Featured,
        }
    }

    fn apply(self, products: &mut [Product]) {
        match self {
            ProductSort::PriceLowHigh => products.sort_by_key(|p| p.price),
            ProductSort::PriceHighLow => products.sort_by_key(|p| Reverse(p.price)),
            ProductSort::Rating => products.sort_by_key(|p| Reverse(p.rating)),
            ProductSort::Newest => products.sort_by_key(|p| Reverse(p.created_at)),
            ProductSort::Featured => products.sort_by_key(|p| !p.is_featured),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn invalid_page() -> AppError {
    AppError::NotFound("Invalid page.".to_string())
}

fn resolve_page_size(raw: Option<&str>) -> usize {
    raw.and_then(|size| size.trim().parse::<usize>().ok())
        .filter(|size| *size > 0)
        .map_or(DEFAULT_PAGE_SIZE, |size| size.min(MAX_PAGE_SIZE))
}

fn paginate<T>(
    items: Vec<T>,
    page: Option<&str>,
    page_size: Option<&str>,
) -> Result<Page<T>, AppError> {
    let size = resolve_page_size(page_size);
    let count = items.len();
    let last_page = count.div_ceil(size).max(1);
    let page = match non_empty(page).map(str::trim) {
        None => 1,
        Some("last") => last_page,
        Some(raw) => raw.parse::<usize>().map_err(|_| invalid_page())?,
    };
    if page == 0 || page > last_page {
        return Err(invalid_page());
    }

    let results = items.into_iter().skip((page - 1) * size).take(size).collect();
    Ok(Page {
        count,
        next: (page < last_page).then_some(page + 1),
        previous: (page > 1).then_some(page - 1),
        results,
    })
}

/// Read-only view of categories and products. Products without stock are
/// never listed.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn CatalogStore>,
}

impl Catalog {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Catalog { store }
    }

    pub async fn categories(&self) -> Result<Vec<CategoryResponse>, AppError> {
        let categories = self.store.list_categories().await?;
        Ok(categories.into_iter().map(CategoryResponse::from).collect())
    }

    pub async fn category_by_slug(&self, slug: &str) -> Result<CategoryResponse, AppError> {
        self.store
            .find_category_by_slug(slug)
            .await?
            .map(CategoryResponse::from)
            .ok_or(AppError::CategoryNotFound)
    }

    pub async fn list_products(
        &self,
        query: &ProductListQuery,
    ) -> Result<Page<ProductResponse>, AppError> {
        let search = non_empty(query.search.as_deref());
        let category_ids = non_empty(query.categories.as_deref())
            .map(|ids| ids.split(',').map(|id| id.trim().to_string()).collect());
        let filter = ProductFilter {
            in_stock_only: true,
            featured_only: false,
            category_ids,
            search: search.map(String::from),
        };

        let mut products = self.store.list_products(&filter).await?;
        ProductSort::from_param(query.sort.as_deref()).apply(&mut products);
        if search.is_some() {
            products.truncate(SEARCH_RESULT_LIMIT);
        }
        debug!("Listing {} products for {:?}", products.len(), filter);

        let page = paginate(products, query.page.as_deref(), query.page_size.as_deref())?;
        Ok(Page {
            count: page.count,
            next: page.next,
            previous: page.previous,
            results: self.with_categories(page.results).await?,
        })
    }

    pub async fn featured_products(&self) -> Result<Vec<ProductResponse>, AppError> {
        let filter = ProductFilter {
            featured_only: true,
            ..ProductFilter::in_stock()
        };
        let products = self.store.list_products(&filter).await?;
        self.with_categories(products).await
    }

    pub async fn product(&self, id: &str) -> Result<ProductResponse, AppError> {
        let product = self
            .store
            .get_product(id)
            .await?
            .filter(Product::in_stock)
            .ok_or_else(|| AppError::NotFound("Not found.".to_string()))?;
        let category = self
            .store
            .get_category(&product.category_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Not found.".to_string()))?;
        Ok(ProductResponse::new(product, category))
    }

    pub async fn products_by_category_slug(
        &self,
        slug: &str,
    ) -> Result<Vec<ProductResponse>, AppError> {
        let category = self
            .store
            .find_category_by_slug(slug)
            .await?
            .ok_or(AppError::CategoryNotFound)?;
        let filter = ProductFilter {
            category_ids: Some(vec![category.id.clone()]),
            ..ProductFilter::in_stock()
        };
        let products = self.store.list_products(&filter).await?;
        Ok(products
            .into_iter()
            .map(|product| ProductResponse::new(product, category.clone()))
            .collect())
    }

    async fn with_categories(&self, products: Vec<Product>) -> Result<Vec<ProductResponse>, AppError> {
        let categories: HashMap<_, _> = self
            .store
            .list_categories()
            .await?
            .into_iter()
            .map(|category| (category.id.clone(), category))
            .collect();

        Ok(products
            .into_iter()
            .filter_map(|product| match categories.get(&product.category_id) {
                Some(category) => Some(ProductResponse::new(product, category.clone())),
                None => {
                    warn!(
                        "Product {} references missing category {}",
                        product.id, product.category_id
                    );
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use crate::store::MemoryStore;
    use chrono::{Duration, Utc};
    use rstest::rstest;
    use rust_decimal::Decimal;

    fn category(id: &str) -> Category {
        Category {
            id: id.to_string(),
            name: id.to_uppercase(),
            icon: "🔧".into(),
            description: String::new(),
            slug: format!("{}-slug", id),
        }
    }

    fn product(id: &str, category_id: &str, price: i64, stock: i64) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            price: Decimal::new(price, 2),
            description: String::new(),
            category_id: category_id.to_string(),
            stock,
            rating: Decimal::new(30, 1),
            reviews: 0,
            is_featured: false,
            color: "#abcdef".into(),
            features: Vec::new(),
            images: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn catalog(products: Vec<Product>) -> Catalog {
        let store = MemoryStore::new();
        store.add_category(category("tools"));
        store.add_category(category("garden"));
        for product in products {
            store.add_product(product);
        }
        Catalog::new(Arc::new(store))
    }

    fn ids(page: &[ProductResponse]) -> Vec<&str> {
        page.iter().map(|p| p.id.as_str()).collect()
    }

    #[tokio::test]
    async fn out_of_stock_products_are_hidden() {
        let catalog = catalog(vec![product("A", "tools", 100, 0), product("B", "tools", 100, 5)]);

        let page = catalog.list_products(&ProductListQuery::default()).await.unwrap();
        assert_eq!(ids(&page.results), vec!["B"]);
        assert_eq!(page.count, 1);

        assert!(matches!(catalog.product("A").await, Err(AppError::NotFound(_))));
        assert_eq!(catalog.product("B").await.unwrap().category.id, "tools");
    }

    #[tokio::test]
    async fn search_matches_name_or_description_and_caps_results() {
        let mut blue = product("blue", "tools", 100, 1);
        blue.name = "Blue Widget".into();
        let mut red = product("red", "tools", 100, 1);
        red.name = "Red Gadget".into();
        red.description = "Pairs well with any widget".into();
        let mut products = vec![blue, red, product("plain", "tools", 100, 1)];
        for i in 0..6 {
            let mut extra = product(&format!("w{}", i), "tools", 100, 1);
            extra.name = format!("Widget {}", i);
            products.push(extra);
        }
        let catalog = catalog(products);

        let query = ProductListQuery {
            search: Some("widget".into()),
            page_size: Some("50".into()),
            ..Default::default()
        };
        let page = catalog.list_products(&query).await.unwrap();
        assert_eq!(page.count, 5);
        assert_eq!(page.results.len(), 5);
        assert!(page.results.iter().all(|p| p.id != "plain"));

        let query = ProductListQuery {
            search: Some("GADGET".into()),
            ..Default::default()
        };
        let page = catalog.list_products(&query).await.unwrap();
        assert_eq!(ids(&page.results), vec!["red"]);
    }

    #[tokio::test]
    async fn search_finds_both_name_and_description_hits() {
        let mut blue = product("blue", "tools", 100, 1);
        blue.name = "Blue Widget".into();
        let mut red = product("red", "tools", 100, 1);
        red.name = "Red Gadget".into();
        red.description = "A widget in disguise".into();
        let catalog = catalog(vec![blue, red]);

        let query = ProductListQuery {
            search: Some("widget".into()),
            ..Default::default()
        };
        let mut found = ids(&catalog.list_products(&query).await.unwrap().results)
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        found.sort();
        assert_eq!(found, vec!["blue", "red"]);
    }

    #[tokio::test]
    async fn filters_by_category_ids() {
        let catalog = catalog(vec![
            product("A", "tools", 100, 1),
            product("B", "garden", 100, 1),
        ]);
        let query = ProductListQuery {
            categories: Some("garden".into()),
            ..Default::default()
        };
        let page = catalog.list_products(&query).await.unwrap();
        assert_eq!(ids(&page.results), vec!["B"]);
    }

    #[rstest]
    #[case(Some("price-low-high"), vec!["cheap", "mid", "pricey"])]
    #[case(Some("price-high-low"), vec!["pricey", "mid", "cheap"])]
    #[case(Some("rating"), vec!["mid", "pricey", "cheap"])]
    #[case(Some("newest"), vec!["pricey", "cheap", "mid"])]
    #[case(None, vec!["pricey", "cheap", "mid"])]
    #[tokio::test]
    async fn sorts_by_requested_order(#[case] sort: Option<&str>, #[case] expected: Vec<&str>) {
        let now = Utc::now();
        let mut cheap = product("cheap", "tools", 100, 1);
        cheap.rating = Decimal::new(10, 1);
        cheap.created_at = now - Duration::days(1);
        let mut mid = product("mid", "tools", 500, 1);
        mid.rating = Decimal::new(50, 1);
        mid.created_at = now - Duration::days(2);
        let mut pricey = product("pricey", "tools", 900, 1);
        pricey.rating = Decimal::new(40, 1);
        pricey.created_at = now;
        pricey.is_featured = true;
        let catalog = catalog(vec![cheap, mid, pricey]);

        let query = ProductListQuery {
            sort: sort.map(String::from),
            ..Default::default()
        };
        let page = catalog.list_products(&query).await.unwrap();
        assert_eq!(ids(&page.results), expected);
    }

    #[tokio::test]
    async fn paginates_with_page_numbers() {
        let products = (0..25)
            .map(|i| product(&format!("p{:02}", i), "tools", 100, 1))
            .collect();
        let catalog = catalog(products);

        let query = ProductListQuery {
            page: Some("2".into()),
            ..Default::default()
        };
        let page = catalog.list_products(&query).await.unwrap();
        assert_eq!(page.count, 25);
        assert_eq!(page.results.len(), 10);
        assert_eq!(page.previous, Some(1));
        assert_eq!(page.next, Some(3));

        let query = ProductListQuery {
            page: Some("4".into()),
            ..Default::default()
        };
        assert!(matches!(
            catalog.list_products(&query).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[rstest]
    #[case::last(Some("last"), None, 3, 5)]
    #[case::padded(Some(" 2 "), None, 2, 10)]
    #[case::bad_size_uses_default(None, Some("abc"), 1, 10)]
    #[case::zero_size_uses_default(None, Some("0"), 1, 10)]
    #[case::size_is_capped(None, Some("1000"), 1, 25)]
    fn page_parameters(
        #[case] page: Option<&str>,
        #[case] size: Option<&str>,
        #[case] number: usize,
        #[case] results: usize,
    ) {
        let items: Vec<usize> = (0..25).collect();
        let page_of = paginate(items, page, size).unwrap();
        assert_eq!(page_of.results.len(), results);
        assert_eq!(page_of.previous, number.checked_sub(1).filter(|p| *p > 0));
    }

    #[rstest]
    #[case("abc")]
    #[case("0")]
    #[case("-1")]
    #[case("4")]
    fn unusable_page_numbers_are_invalid(#[case] page: &str) {
        let items: Vec<usize> = (0..25).collect();
        let err = paginate(items, Some(page), None).unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref msg) if msg == "Invalid page."));
    }

    #[tokio::test]
    async fn empty_catalog_still_has_a_first_page() {
        let page = catalog(Vec::new())
            .list_products(&ProductListQuery::default())
            .await
            .unwrap();
        assert_eq!(page.count, 0);
        assert_eq!(page.next, None);
        assert!(page.results.is_empty());
    }

    #[tokio::test]
    async fn featured_lists_only_featured_in_stock() {
        let mut shown = product("shown", "tools", 100, 2);
        shown.is_featured = true;
        let mut sold_out = product("sold-out", "tools", 100, 0);
        sold_out.is_featured = true;
        let catalog = catalog(vec![shown, sold_out, product("plain", "tools", 100, 2)]);

        let featured = catalog.featured_products().await.unwrap();
        assert_eq!(ids(&featured), vec!["shown"]);
    }

    #[tokio::test]
    async fn products_by_category_slug() {
        let catalog = catalog(vec![
            product("A", "tools", 100, 1),
            product("B", "garden", 100, 1),
            product("C", "tools", 100, 0),
        ]);

        let products = catalog.products_by_category_slug("tools-slug").await.unwrap();
        assert_eq!(ids(&products), vec!["A"]);
        assert_eq!(products[0].category.slug, "tools-slug");

        assert!(matches!(
            catalog.products_by_category_slug("nope").await,
            Err(AppError::CategoryNotFound)
        ));
        assert!(matches!(
            catalog.category_by_slug("nope").await,
            Err(AppError::CategoryNotFound)
        ));
        assert_eq!(catalog.categories().await.unwrap().len(), 2);
    }
}
