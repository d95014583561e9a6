use serde::Serialize;

use super::{Amount, AssetId};

/// A purchasable catalog item.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    pub description: String,
    pub price: Amount,
}

/// The static asset catalog. Purchases are priced from here, never from the
/// client.
#[derive(Debug, Clone)]
pub struct Catalog {
    assets: Vec<Asset>,
}

impl Catalog {
    pub fn new(assets: Vec<Asset>) -> Self {
        Self { assets }
    }

    pub fn standard() -> Self {
        Self::new(vec![
            asset(
                "starter-template-pack",
                "Starter Template Pack",
                "Production-ready boilerplates for auth and payments flows.",
                120,
            ),
            asset(
                "api-observability-kit",
                "API Observability Kit",
                "Structured logs, traces, and dashboard presets for services.",
                180,
            ),
            asset(
                "secure-ci-bundle",
                "Secure CI Bundle",
                "CI templates with SAST, dependency checks, and release gates.",
                250,
            ),
            asset(
                "growth-analytics-pack",
                "Growth Analytics Pack",
                "Event taxonomy and growth dashboard starter assets.",
                90,
            ),
        ])
    }

    pub fn find(&self, asset_id: &str) -> Option<&Asset> {
        self.assets.iter().find(|asset| asset.id == asset_id)
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }
}

fn asset(id: &str, name: &str, description: &str, price: u128) -> Asset {
    Asset {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        price: Amount::new(price).unwrap_or_else(|| unreachable!("catalog prices are positive")),
    }
}
