//! Per-region minimum price resolution.
//!
//! A product page carries a base table (region → provider → price) and a
//! sparse table of special offers keyed by (provider, product, region).
//! Offers replace the base price of their provider in that region when they
//! carry a positive price.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::{Map, Value};

mod column;

pub use column::region_column;

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];

/// Strip price formatting and truncate to an integer amount.
///
/// Anything that does not read as a finite number is `0`, which callers
/// treat as "no price".
pub fn normalize_price(value: Option<&Value>) -> i64 {
    let amount = match value {
        Some(Value::String(raw)) => {
            let cleaned = raw
                .chars()
                .filter(|c| *c != ',' && !CURRENCY_SYMBOLS.contains(c))
                .collect::<String>();
            let cleaned = cleaned.trim();
            if cleaned.is_empty() {
                return 0;
            }
            cleaned.parse::<f64>().ok()
        }
        Some(Value::Number(n)) => match n.as_i64() {
            Some(whole) => return whole.max(0),
            None => n.as_f64(),
        },
        _ => None,
    };
    match amount {
        Some(amount) if amount.is_finite() && amount > 0.0 => amount.trunc() as i64,
        _ => 0,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OfferKey {
    provider: String,
    product: String,
    region: String,
}

/// Special prices flattened from the nested `offerPrices` structure.
///
/// Only positive prices are kept, so a hit always overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferTable {
    prices: HashMap<OfferKey, i64>,
}

impl OfferTable {
    pub fn from_object(offers: &Map<String, Value>) -> Self {
        let mut prices = HashMap::new();
        for (provider, products) in offers {
            let Some(products) = products.as_object() else {
                continue;
            };
            for (product, regions) in products {
                let Some(regions) = regions.as_object() else {
                    continue;
                };
                for (region, offer) in regions {
                    let price = normalize_price(offer.get("special_price"));
                    if price > 0 {
                        prices.insert(
                            OfferKey {
                                provider: provider.clone(),
                                product: product.clone(),
                                region: region.clone(),
                            },
                            price,
                        );
                    }
                }
            }
        }
        Self { prices }
    }

    pub fn get(&self, provider: &str, product: &str, region: &str) -> Option<i64> {
        self.prices
            .get(&OfferKey {
                provider: provider.to_owned(),
                product: product.to_owned(),
                region: region.to_owned(),
            })
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Region id → display name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionNames(IndexMap<String, String>);

impl RegionNames {
    pub fn from_object(names: &Map<String, Value>) -> Self {
        Self(
            names
                .iter()
                .map(|(id, name)| {
                    let name = match name {
                        Value::String(name) => name.clone(),
                        other => other.to_string(),
                    };
                    (id.clone(), name)
                })
                .collect(),
        )
    }

    pub fn display(&self, region_id: &str) -> String {
        self.0
            .get(region_id)
            .cloned()
            .unwrap_or_else(|| format!("Region_ID_{region_id}"))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Offers that apply to one product page.
#[derive(Debug, Clone, Copy)]
pub struct Offers<'a> {
    pub table: &'a OfferTable,
    pub product_id: &'a str,
}

/// Minimum price per region name, in base table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionPrices(IndexMap<String, i64>);

impl RegionPrices {
    /// Region holding the global minimum.
    ///
    /// Ties go to the lexicographically smallest region name.
    pub fn best(&self) -> Option<(&str, i64)> {
        self.0
            .iter()
            .min_by(|(a_name, a_price), (b_name, b_price)| {
                a_price.cmp(b_price).then_with(|| a_name.cmp(b_name))
            })
            .map(|(name, price)| (name.as_str(), *price))
    }

    pub fn get(&self, region: &str) -> Option<i64> {
        self.0.get(region).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(name, price)| (name.as_str(), *price))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, i64)> for RegionPrices {
    fn from_iter<T: IntoIterator<Item = (S, i64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(name, price)| (name.into(), price)).collect())
    }
}

fn provider_price(
    region_id: &str,
    provider_id: &str,
    data: &Map<String, Value>,
    offers: Option<Offers<'_>>,
) -> i64 {
    let base = normalize_price(data.get("price"));
    offers
        .and_then(|offers| offers.table.get(provider_id, offers.product_id, region_id))
        .unwrap_or(base)
}

/// Resolve the minimum positive price of every region in `base`.
///
/// Regions without any positive provider price are left out.
pub fn resolve(
    base: &Map<String, Value>,
    offers: Option<Offers<'_>>,
    names: &RegionNames,
) -> RegionPrices {
    let mut resolved = IndexMap::new();
    for (region_id, providers) in base {
        let Some(providers) = providers.as_object() else {
            continue;
        };
        let minimum = providers
            .iter()
            .filter_map(|(provider_id, data)| {
                let data = data.as_object()?;
                Some(provider_price(region_id, provider_id, data, offers))
            })
            .filter(|price| *price > 0)
            .min();
        if let Some(minimum) = minimum {
            resolved.insert(names.display(region_id), minimum);
        }
    }
    RegionPrices(resolved)
}
