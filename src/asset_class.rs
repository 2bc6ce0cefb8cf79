use crate::error::InputError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Broad asset class used to select long-run statistics and as the unit of cycle adjustment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum AssetClass {
    Stocks,
    Bonds,
    RealEstate,
    Commodities,
    Cash,
    Alternatives,
}

impl AssetClass {
    pub const ALL: [AssetClass; 6] = [
        AssetClass::Stocks,
        AssetClass::Bonds,
        AssetClass::RealEstate,
        AssetClass::Commodities,
        AssetClass::Cash,
        AssetClass::Alternatives,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Stocks => "stocks",
            AssetClass::Bonds => "bonds",
            AssetClass::RealEstate => "real_estate",
            AssetClass::Commodities => "commodities",
            AssetClass::Cash => "cash",
            AssetClass::Alternatives => "alternatives",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetClass {
    type Err = InputError;

    /// Accepts the canonical names plus the labels upstream holdings feeds tend to use
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();

        match normalized.as_str() {
            "stocks" | "stock" | "equity" | "equities" | "shares" => Ok(AssetClass::Stocks),
            "bonds" | "bond" | "fixed_income" | "treasuries" | "credit" => Ok(AssetClass::Bonds),
            "real_estate" | "realestate" | "reit" | "reits" | "property" => {
                Ok(AssetClass::RealEstate)
            }
            "commodities" | "commodity" | "gold" | "precious_metals" => {
                Ok(AssetClass::Commodities)
            }
            "cash" | "money_market" | "t_bills" => Ok(AssetClass::Cash),
            "alternatives" | "alternative" | "alts" | "hedge_funds" | "private_equity" => {
                Ok(AssetClass::Alternatives)
            }
            _ => Err(InputError::UnknownAssetClass(s.to_string())),
        }
    }
}

impl TryFrom<String> for AssetClass {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
