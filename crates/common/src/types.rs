use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MeshError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub instance_id: Uuid,
}

impl ServiceInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            instance_id: Uuid::new_v4(),
        }
    }
}

/// The four remote-owned collections the sync engine mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Product,
    Order,
    Customer,
    Review,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Product,
        EntityType::Order,
        EntityType::Customer,
        EntityType::Review,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Product => "product",
            EntityType::Order => "order",
            EntityType::Customer => "customer",
            EntityType::Review => "review",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(EntityType::Product),
            "order" => Ok(EntityType::Order),
            "customer" => Ok(EntityType::Customer),
            "review" => Ok(EntityType::Review),
            other => Err(MeshError::Validation(format!(
                "unknown entity type: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_round_trips_through_str() {
        for et in EntityType::ALL {
            assert_eq!(EntityType::from_str(et.as_str()).unwrap(), et);
        }
    }

    #[test]
    fn entity_type_rejects_unknown() {
        let err = EntityType::from_str("coupon").unwrap_err();
        assert!(matches!(err, MeshError::Validation(_)));
    }
}
