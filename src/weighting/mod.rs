pub mod calculator;
pub mod strategy;

pub use calculator::{diversity_score, normalize_weights, WeightCalculator};
pub use strategy::{ModelWeight, WeightBounds, WeightStrategy};
