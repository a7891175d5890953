//! Token package catalog
//!
//! Maps purchasable packages to token amounts. The catalog ships with
//! defaults and can be replaced wholesale from configuration; unknown
//! package ids are an error, never a fallback price.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One purchasable token package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPackage {
    pub id: String,
    pub name: String,
    /// Tokens credited on purchase
    pub tokens: Decimal,
    /// Price in `currency`
    pub price: Decimal,
    /// Currency code (ISO 4217)
    pub currency: String,
}

/// Package lookup table
#[derive(Debug, Clone)]
pub struct PricingTable {
    packages: Vec<TokenPackage>,
}

impl PricingTable {
    pub fn new(packages: Vec<TokenPackage>) -> Self {
        Self { packages }
    }

    pub fn package(&self, id: &str) -> Option<&TokenPackage> {
        self.packages.iter().find(|p| p.id == id)
    }

    pub fn packages(&self) -> &[TokenPackage] {
        &self.packages
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::new(vec![
            TokenPackage {
                id: "starter".to_string(),
                name: "Starter".to_string(),
                tokens: Decimal::from(100),
                price: Decimal::new(499, 2),
                currency: "USD".to_string(),
            },
            TokenPackage {
                id: "standard".to_string(),
                name: "Standard".to_string(),
                tokens: Decimal::from(550),
                price: Decimal::new(1999, 2),
                currency: "USD".to_string(),
            },
            TokenPackage {
                id: "plus".to_string(),
                name: "Plus".to_string(),
                tokens: Decimal::from(1200),
                price: Decimal::new(3999, 2),
                currency: "USD".to_string(),
            },
        ])
    }
}
