use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Cost-flow assumption, fixed when a ledger is created.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValuationMethod {
    /// Oldest layers are consumed first.
    #[default]
    Fifo,
    /// Newest layers are consumed first.
    Lifo,
    /// Every unit carries the blended cost of all layers.
    WeightedAverage,
}

impl ValuationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValuationMethod::Fifo => "FIFO",
            ValuationMethod::Lifo => "LIFO",
            ValuationMethod::WeightedAverage => "WEIGHTED_AVERAGE",
        }
    }
}

impl core::fmt::Display for ValuationMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ValuationMethod {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FIFO" => Ok(ValuationMethod::Fifo),
            "LIFO" => Ok(ValuationMethod::Lifo),
            "WEIGHTED_AVERAGE" => Ok(ValuationMethod::WeightedAverage),
            _ => Err(LedgerError::InvalidValuationMethod(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_methods_case_insensitively() {
        assert_eq!("fifo".parse::<ValuationMethod>().unwrap(), ValuationMethod::Fifo);
        assert_eq!("LIFO".parse::<ValuationMethod>().unwrap(), ValuationMethod::Lifo);
        assert_eq!(
            "Weighted_Average".parse::<ValuationMethod>().unwrap(),
            ValuationMethod::WeightedAverage
        );
        assert_eq!(
            "AVG".parse::<ValuationMethod>(),
            Err(LedgerError::InvalidValuationMethod("AVG".to_string()))
        );
    }

    #[test]
    fn serializes_as_upper_snake_case() {
        let json = serde_json::to_string(&ValuationMethod::WeightedAverage).unwrap();
        assert_eq!(json, "\"WEIGHTED_AVERAGE\"");
    }
}
