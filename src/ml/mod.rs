/*!
 * # Machine Learning Module
 *
 * Client side of the external shelf-life prediction service. The engine depends only on
 * the [`ShelfLifePredictor`] trait; [`shelf_life_client::HttpShelfLifePredictor`] is the
 * production implementation.
 */

pub mod shelf_life_client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::PredictorConfig;

pub use shelf_life_client::HttpShelfLifePredictor;

/// Category vocabulary understood by the prediction model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureCategory {
    #[serde(rename = "Sayuran")]
    Vegetable,
    #[serde(rename = "Buah")]
    Fruit,
    #[serde(rename = "Protein Hewani")]
    AnimalProtein,
    #[serde(rename = "Protein Nabati")]
    PlantProtein,
    #[serde(rename = "Karbohidrat")]
    Carbohydrate,
}

const FRUIT_WORDS: &[&str] = &[
    "pisang", "apel", "jeruk", "mangga", "pepaya", "semangka", "anggur", "melon", "nanas",
    "banana", "apple", "orange", "mango",
];
const ANIMAL_PROTEIN_WORDS: &[&str] = &[
    "ayam", "daging", "ikan", "telur", "udang", "cumi", "bebek", "chicken", "beef", "fish",
    "egg", "shrimp",
];
const PLANT_PROTEIN_WORDS: &[&str] = &["tahu", "tempe", "kacang", "tofu", "tempeh", "bean"];
const CARBOHYDRATE_WORDS: &[&str] = &[
    "beras", "nasi", "kentang", "tepung", "roti", "mie", "jagung", "singkong", "rice", "potato",
    "flour", "bread", "noodle",
];

impl FeatureCategory {
    /// Model-side label, as sent in the request payload.
    pub fn label(self) -> &'static str {
        match self {
            FeatureCategory::Vegetable => "Sayuran",
            FeatureCategory::Fruit => "Buah",
            FeatureCategory::AnimalProtein => "Protein Hewani",
            FeatureCategory::PlantProtein => "Protein Nabati",
            FeatureCategory::Carbohydrate => "Karbohidrat",
        }
    }

    /// Picks the model category by keyword; anything unrecognised is treated as a vegetable.
    pub fn for_ingredient(ingredient_name: &str) -> Self {
        let lower = ingredient_name.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if has(ANIMAL_PROTEIN_WORDS) {
            FeatureCategory::AnimalProtein
        } else if has(PLANT_PROTEIN_WORDS) {
            FeatureCategory::PlantProtein
        } else if has(FRUIT_WORDS) {
            FeatureCategory::Fruit
        } else if has(CARBOHYDRATE_WORDS) {
            FeatureCategory::Carbohydrate
        } else {
            FeatureCategory::Vegetable
        }
    }
}

/// Features sent to the prediction service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShelfLifeRequest {
    pub category: FeatureCategory,
    pub storage_temperature: f64,
    pub quantity: f64,
}

#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("prediction service rejected the API key")]
    Unauthorized,

    #[error("prediction service returned HTTP {0}")]
    Status(u16),

    #[error("no prediction within {0} ms")]
    Timeout(u64),

    #[error("malformed prediction response: {0}")]
    MalformedResponse(String),

    #[error("prediction service unavailable: {0}")]
    Unavailable(String),
}

/// Anything that can predict shelf life in days.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShelfLifePredictor: Send + Sync {
    /// Predicted shelf lives in days, most likely first.
    async fn predict(&self, request: &ShelfLifeRequest) -> Result<Vec<f64>, PredictorError>;

    /// Where the predictor lives, for status reporting.
    fn endpoint(&self) -> Option<String> {
        None
    }
}

/// Builds the HTTP predictor when it is enabled and has an endpoint.
pub fn build_predictor(
    config: &PredictorConfig,
) -> Result<Option<Arc<dyn ShelfLifePredictor>>, PredictorError> {
    if !config.enabled {
        return Ok(None);
    }
    match config.endpoint.as_deref() {
        Some(endpoint) if !endpoint.trim().is_empty() => {
            let predictor =
                HttpShelfLifePredictor::new(endpoint, config.api_key.clone(), config.timeout())?;
            Ok(Some(Arc::new(predictor)))
        }
        _ => Ok(None),
    }
}
