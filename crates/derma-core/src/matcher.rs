//! Product matching: skin tag derivation, catalog filtering, random sampling.
//!
//! Filtering is fully deterministic. Sampling is the only randomized step in
//! the whole pipeline: repeated calls with identical inputs may return
//! different subsets of the same qualifying pool, which keeps the shortlist
//! from looking identical on every visit.

use crate::catalog::{Catalog, ProductRecord, ProductTag};
use crate::config::{MarkerMatch, MatcherConfig};
use crate::types::{SkinMetrics, SkinTag};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

const OILY_ABOVE: f32 = 50.0;
const DRY_BELOW: f32 = 20.0;

/// Derived tag plus the sampled products.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub tag: SkinTag,
    pub products: Vec<ProductRecord>,
}

/// Tag from oiliness alone.
pub fn tag_from_oiliness(oiliness: f32) -> SkinTag {
    if oiliness > OILY_ABOVE {
        SkinTag::Oily
    } else if oiliness < DRY_BELOW {
        SkinTag::Dry
    } else {
        SkinTag::Normal
    }
}

/// Whether the declared skin type carries any configured sensitivity marker.
pub fn has_sensitivity_marker(declared: &str, config: &MatcherConfig) -> bool {
    let declared = declared.to_lowercase();
    match config.marker_match {
        MarkerMatch::Substring => config
            .sensitivity_markers
            .iter()
            .any(|m| declared.contains(&m.to_lowercase())),
        MarkerMatch::Token => {
            // Combining marks (Thai tone marks) are not alphanumeric, so only
            // whitespace and ASCII punctuation separate tokens.
            let tokens: Vec<&str> = declared
                .split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
                .filter(|t| !t.is_empty())
                .collect();
            config
                .sensitivity_markers
                .iter()
                .any(|m| tokens.contains(&m.to_lowercase().as_str()))
        }
    }
}

/// Sensitivity in the declared skin type overrides the oiliness tag.
pub fn derive_tag(metrics: &SkinMetrics, declared: &str, config: &MatcherConfig) -> SkinTag {
    if has_sensitivity_marker(declared, config) {
        SkinTag::Sensitive
    } else {
        tag_from_oiliness(metrics.oiliness)
    }
}

fn product_tag(tag: SkinTag) -> ProductTag {
    match tag {
        SkinTag::Oily => ProductTag::Oily,
        SkinTag::Dry => ProductTag::Dry,
        SkinTag::Normal => ProductTag::Normal,
        SkinTag::Sensitive => ProductTag::Sensitive,
    }
}

/// Products tagged with `tag` or `all_skin_types`, in catalog order.
pub fn qualifying(catalog: &Catalog, tag: SkinTag) -> Vec<&ProductRecord> {
    let wanted = product_tag(tag);
    catalog
        .iter()
        .filter(|p| p.has_tag(wanted) || p.has_tag(ProductTag::AllSkinTypes))
        .collect()
}

/// Uniform sample without replacement of `min(pool.len(), max_count)` products.
pub fn sample<R: Rng + ?Sized>(pool: &[&ProductRecord], max_count: usize, rng: &mut R) -> Vec<ProductRecord> {
    pool.choose_multiple(rng, max_count.min(pool.len()))
        .map(|p| (*p).clone())
        .collect()
}

/// Turns metrics and the declared skin type into a product shortlist.
#[derive(Debug, Clone, Default)]
pub struct ProductMatcher {
    config: MatcherConfig,
}

impl ProductMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn tag_for(&self, metrics: &SkinMetrics, declared: &str) -> SkinTag {
        derive_tag(metrics, declared, &self.config)
    }

    pub fn recommend(&self, metrics: &SkinMetrics, declared: &str, catalog: &Catalog) -> Recommendation {
        self.recommend_with_rng(metrics, declared, catalog, &mut rand::thread_rng())
    }

    /// [`recommend`](Self::recommend) with a caller-supplied RNG.
    pub fn recommend_with_rng<R: Rng + ?Sized>(
        &self,
        metrics: &SkinMetrics,
        declared: &str,
        catalog: &Catalog,
        rng: &mut R,
    ) -> Recommendation {
        let tag = self.tag_for(metrics, declared);
        let pool = qualifying(catalog, tag);
        let products = sample(&pool, self.config.max_count, rng);

        if pool.is_empty() {
            tracing::info!(%tag, "no qualifying products");
        } else {
            tracing::debug!(%tag, pool = pool.len(), selected = products.len(), "products sampled");
        }

        Recommendation { tag, products }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn metrics(oiliness: f32, redness: f32) -> SkinMetrics {
        SkinMetrics { oiliness, redness, evenness: 80.0, coverage: 60.0 }
    }

    fn product(id: u32, tags: &[ProductTag]) -> ProductRecord {
        ProductRecord {
            id,
            brand: "Brand".into(),
            name: format!("Product {id}"),
            price: 100.0,
            image_url: format!("/static/images/{id}.webp"),
            usage: "Morning and evening".into(),
            ingredients: "N/A".into(),
            benefits: "N/A".into(),
            is_external: false,
            affiliate_link: "#".into(),
            tags: tags.to_vec(),
        }
    }

    fn oily_catalog() -> Catalog {
        let mut records: Vec<ProductRecord> = (1..=6).map(|id| product(id, &[ProductTag::Oily])).collect();
        records.push(product(7, &[ProductTag::AllSkinTypes]));
        records.push(product(8, &[ProductTag::AllSkinTypes]));
        records.push(product(9, &[ProductTag::Dry]));
        records.push(product(10, &[ProductTag::Sensitive]));
        Catalog::from_records(records).unwrap()
    }

    #[test]
    fn test_tag_thresholds() {
        let config = MatcherConfig::default();
        let cases = [
            (0.0, SkinTag::Dry),
            (19.9, SkinTag::Dry),
            (20.0, SkinTag::Normal),
            (35.0, SkinTag::Normal),
            (50.0, SkinTag::Normal),
            (50.1, SkinTag::Oily),
            (100.0, SkinTag::Oily),
        ];
        for (oiliness, expected) in cases {
            assert_eq!(derive_tag(&metrics(oiliness, 0.0), "unspecified", &config), expected, "oiliness {oiliness}");
        }
    }

    #[test]
    fn test_sensitivity_overrides_every_oiliness() {
        let config = MatcherConfig::default();
        for oiliness in [0.0, 30.0, 90.0] {
            assert_eq!(derive_tag(&metrics(oiliness, 0.0), "sensitive skin", &config), SkinTag::Sensitive);
            assert_eq!(derive_tag(&metrics(oiliness, 0.0), "ผิวแพ้ง่าย", &config), SkinTag::Sensitive);
        }
    }

    #[test]
    fn test_marker_substring_is_case_insensitive() {
        let config = MatcherConfig::default();
        assert!(has_sensitivity_marker("Very SENSITIVE, oily", &config));
        assert!(has_sensitivity_marker("hypersensitive", &config));
        assert!(!has_sensitivity_marker("unspecified", &config));
        assert!(!has_sensitivity_marker("", &config));
    }

    #[test]
    fn test_marker_token_match() {
        let config = MatcherConfig { marker_match: MarkerMatch::Token, ..MatcherConfig::default() };
        assert!(has_sensitivity_marker("oily, Sensitive", &config));
        assert!(!has_sensitivity_marker("hypersensitive", &config));
    }

    #[test]
    fn test_thai_marker_token_match() {
        let config = MatcherConfig { marker_match: MarkerMatch::Token, ..MatcherConfig::default() };
        assert!(has_sensitivity_marker("แพ้ง่าย", &config));
        assert!(has_sensitivity_marker("ผิว แพ้ง่าย", &config));
        assert!(has_sensitivity_marker("oily,แพ้ง่าย", &config));
        assert_eq!(derive_tag(&metrics(80.0, 0.0), "ผิว แพ้ง่าย", &config), SkinTag::Sensitive);
    }

    #[test]
    fn test_custom_marker_list() {
        let config = MatcherConfig {
            sensitivity_markers: vec!["allergic".into()],
            ..MatcherConfig::default()
        };
        assert!(has_sensitivity_marker("Allergic to fragrance", &config));
        assert!(!has_sensitivity_marker("sensitive", &config));
    }

    #[test]
    fn test_qualifying_is_deterministic_and_ordered() {
        let catalog = oily_catalog();
        let ids: Vec<u32> = qualifying(&catalog, SkinTag::Oily).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let dry: Vec<u32> = qualifying(&catalog, SkinTag::Dry).iter().map(|p| p.id).collect();
        assert_eq!(dry, vec![7, 8, 9]);
    }

    #[test]
    fn test_unknown_tag_never_qualifies() {
        let catalog = Catalog::from_records(vec![product(1, &[ProductTag::Unknown])]).unwrap();
        for tag in [SkinTag::Oily, SkinTag::Dry, SkinTag::Normal, SkinTag::Sensitive] {
            assert!(qualifying(&catalog, tag).is_empty());
        }
    }

    #[test]
    fn test_oily_scenario_returns_four_distinct() {
        let catalog = oily_catalog();
        let matcher = ProductMatcher::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let rec = matcher.recommend_with_rng(&metrics(70.0, 10.0), "unspecified", &catalog, &mut rng);
            assert_eq!(rec.tag, SkinTag::Oily);
            assert_eq!(rec.products.len(), 4);
            let ids: HashSet<u32> = rec.products.iter().map(|p| p.id).collect();
            assert_eq!(ids.len(), 4);
            assert!(rec
                .products
                .iter()
                .all(|p| p.has_tag(ProductTag::Oily) || p.has_tag(ProductTag::AllSkinTypes)));
        }
    }

    #[test]
    fn test_sensitive_scenario_single_product() {
        let catalog = Catalog::from_records(vec![
            product(1, &[ProductTag::Sensitive]),
            product(2, &[ProductTag::Oily]),
            product(3, &[ProductTag::Normal]),
        ])
        .unwrap();
        let rec = ProductMatcher::default().recommend(&metrics(30.0, 5.0), "sensitive skin", &catalog);
        assert_eq!(rec.tag, SkinTag::Sensitive);
        assert_eq!(rec.products.len(), 1);
        assert_eq!(rec.products[0].id, 1);
    }

    #[test]
    fn test_empty_pool_is_empty_not_error() {
        let catalog = Catalog::from_records(vec![product(1, &[ProductTag::Oily])]).unwrap();
        let rec = ProductMatcher::default().recommend(&metrics(5.0, 0.0), "unspecified", &catalog);
        assert_eq!(rec.tag, SkinTag::Dry);
        assert!(rec.products.is_empty());
    }

    #[test]
    fn test_max_count_bounds_sample() {
        let catalog = oily_catalog();
        let pool = qualifying(&catalog, SkinTag::Oily);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sample(&pool, 0, &mut rng).len(), 0);
        assert_eq!(sample(&pool, 3, &mut rng).len(), 3);
        assert_eq!(sample(&pool, 100, &mut rng).len(), pool.len());
    }

    #[test]
    fn test_sampling_reaches_whole_pool() {
        let catalog = oily_catalog();
        let pool = qualifying(&catalog, SkinTag::Oily);
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.extend(sample(&pool, 4, &mut rng).into_iter().map(|p| p.id));
        }
        assert_eq!(seen.len(), pool.len());
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let catalog = oily_catalog();
        let pool = qualifying(&catalog, SkinTag::Oily);
        let a: Vec<u32> = sample(&pool, 4, &mut StdRng::seed_from_u64(9)).iter().map(|p| p.id).collect();
        let b: Vec<u32> = sample(&pool, 4, &mut StdRng::seed_from_u64(9)).iter().map(|p| p.id).collect();
        assert_eq!(a, b);
    }
}
