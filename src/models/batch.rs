//! Batch aggregate and the closed enumerations that describe it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Coarse three-level classification of a batch's remaining usable life.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum FreshnessStatus {
    Green,
    Yellow,
    Red,
}

impl FreshnessStatus {
    /// Rank used to check that status never improves for a fixed entry/expiry pair.
    pub fn severity(self) -> u8 {
        match self {
            FreshnessStatus::Green => 0,
            FreshnessStatus::Yellow => 1,
            FreshnessStatus::Red => 2,
        }
    }
}

/// Ingredient category.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Category {
    Vegetable,
    Fruit,
    Protein,
    Staple,
    Other,
}

const VEGETABLE_KEYWORDS: &[&str] = &[
    "bayam", "kangkung", "sawi", "selada", "tomat", "timun", "wortel", "kentang", "bawang",
    "cabai", "terong", "kubis", "buncis", "jagung", "spinach", "tomato", "carrot", "potato",
    "onion", "cabbage", "lettuce",
];
const FRUIT_KEYWORDS: &[&str] = &[
    "pisang", "apel", "jeruk", "mangga", "pepaya", "semangka", "anggur", "strawberry", "melon",
    "nanas", "banana", "apple", "orange", "mango", "papaya", "watermelon",
];
const PROTEIN_KEYWORDS: &[&str] = &[
    "ayam", "daging", "ikan", "udang", "telur", "tahu", "tempe", "cumi", "bebek", "chicken",
    "beef", "fish", "shrimp", "egg", "tofu",
];
const STAPLE_KEYWORDS: &[&str] = &[
    "beras", "tepung", "gula", "garam", "minyak", "roti", "pasta", "mie", "rice", "flour",
    "sugar", "salt", "oil", "bread", "noodle",
];

impl Category {
    /// Infers a category from an ingredient name when intake does not supply one.
    pub fn infer(ingredient_name: &str) -> Self {
        let lower = ingredient_name.to_lowercase();
        let matches = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

        if matches(VEGETABLE_KEYWORDS) {
            Category::Vegetable
        } else if matches(FRUIT_KEYWORDS) {
            Category::Fruit
        } else if matches(PROTEIN_KEYWORDS) {
            Category::Protein
        } else if matches(STAPLE_KEYWORDS) {
            Category::Staple
        } else {
            Category::Other
        }
    }
}

/// Storage class a batch is kept in. Free-text locations are converted once at intake
/// by [`StorageClass::normalize`]; everything downstream works on the enum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum StorageClass {
    Refrigerator,
    Freezer,
    Pantry,
    Other,
}

impl StorageClass {
    pub fn normalize(location: &str) -> Self {
        match location.trim().to_lowercase().as_str() {
            "kulkas" | "refrigerator" | "fridge" | "chiller" => StorageClass::Refrigerator,
            "freezer" => StorageClass::Freezer,
            "gudang" | "pantry" | "dry storage" => StorageClass::Pantry,
            _ => StorageClass::Other,
        }
    }

    /// Short code used in batch codes.
    pub fn code(self) -> &'static str {
        match self {
            StorageClass::Refrigerator => "RFG",
            StorageClass::Freezer => "FRZ",
            StorageClass::Pantry => "PNT",
            StorageClass::Other => "OTR",
        }
    }

    /// Nominal storage temperature in °C, sent to the shelf-life predictor when the
    /// intake did not measure one.
    pub fn default_temperature(self) -> f64 {
        match self {
            StorageClass::Refrigerator => 4.0,
            StorageClass::Freezer => -18.0,
            StorageClass::Pantry | StorageClass::Other => 25.0,
        }
    }

    /// Factor applied to the base shelf life; colder storage decays slower.
    pub fn shelf_life_multiplier(self) -> f64 {
        match self {
            StorageClass::Freezer => 30.0,
            StorageClass::Refrigerator => 3.0,
            StorageClass::Pantry | StorageClass::Other => 1.0,
        }
    }
}

/// A physical lot of one ingredient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub batch_code: String,
    pub ingredient_name: String,
    pub category: Category,
    pub weight: Decimal,
    pub unit: String,
    pub entry_date: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub freshness_status: FreshnessStatus,
    pub active: bool,
    pub storage: StorageClass,
    pub source: Option<String>,
    pub notes: Option<String>,
}

impl Batch {
    /// Whole days from `now` until expiry, negative once past. `None` without an expiry.
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expiry_date.map(|expiry| (expiry - now).num_days())
    }

    pub fn is_exhausted(&self) -> bool {
        self.weight.is_zero()
    }
}

/// Why a batch is taken out of stock before it is used up.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum WriteOffReason {
    Waste,
    Damaged,
    Expired,
}

/// Intake request for a new batch.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewBatch {
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    pub ingredient_name: String,
    /// Inferred from the name when absent
    pub category: Option<Category>,
    #[validate(custom = "validate_positive_weight")]
    pub weight: Decimal,
    #[validate(length(min = 1, max = 20))]
    pub unit: String,
    /// Free-text location as typed at intake ("kulkas", "freezer", ...)
    #[validate(length(max = 50))]
    pub storage_location: String,
    /// Defaults to the time of intake
    pub entry_date: Option<DateTime<Utc>>,
    /// Authoritative expiry, if the supplier printed one
    pub expiry_date: Option<DateTime<Utc>>,
    /// Measured storage temperature in °C
    pub storage_temperature: Option<f64>,
    #[validate(length(max = 100))]
    pub source: Option<String>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

impl NewBatch {
    pub fn new(ingredient_name: &str, weight: Decimal, unit: &str, storage_location: &str) -> Self {
        Self {
            ingredient_name: ingredient_name.to_string(),
            category: None,
            weight,
            unit: unit.to_string(),
            storage_location: storage_location.to_string(),
            entry_date: None,
            expiry_date: None,
            storage_temperature: None,
            source: None,
            notes: None,
        }
    }
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

fn validate_positive_weight(weight: &Decimal) -> Result<(), ValidationError> {
    if *weight <= Decimal::ZERO {
        let mut err = ValidationError::new("weight");
        err.message = Some("weight must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}
