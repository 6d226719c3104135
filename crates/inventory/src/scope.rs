//! Identity and scope value objects: SKU, tenant/facility scope, bin address.

use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, TenantId, ValueObject};

/// Stock-keeping unit code (trimmed, non-empty).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Sku {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Sku {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Sku::new(value)
    }
}

impl From<Sku> for String {
    fn from(value: Sku) -> Self {
        value.0
    }
}

impl ValueObject for Sku {}

/// Ownership scope of a stock record (3PL operator, site, merchant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockScope {
    pub tenant_id: TenantId,
    pub facility_id: String,
    pub warehouse_id: String,
    pub seller_id: Option<String>,
}

impl StockScope {
    pub fn new(
        tenant_id: TenantId,
        facility_id: impl Into<String>,
        warehouse_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            facility_id: facility_id.into(),
            warehouse_id: warehouse_id.into(),
            seller_id: None,
        }
    }

    pub fn with_seller(mut self, seller_id: impl Into<String>) -> Self {
        self.seller_id = Some(seller_id.into());
        self
    }
}

impl ValueObject for StockScope {}

/// Physical bin address within a zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationAddress {
    pub aisle: String,
    pub rack: u32,
    pub level: u32,
}

impl ValueObject for LocationAddress {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sku_is_trimmed_and_non_empty() {
        assert_eq!(Sku::new("  SKU-1 ").unwrap().as_str(), "SKU-1");
        assert!(Sku::new("   ").is_err());
    }

    #[test]
    fn sku_deserialization_validates() {
        assert!(serde_json::from_str::<Sku>("\"\"").is_err());
        let sku: Sku = serde_json::from_str("\"ABC\"").unwrap();
        assert_eq!(sku.to_string(), "ABC");
    }
}
