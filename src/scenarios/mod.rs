//! Historical analog catalogue and comparative scenario scoring
pub mod catalog;
pub mod scorer;

pub use catalog::{AnalogCatalog, HistoricalAnalog};
pub use scorer::{ScenarioOutcome, ScenarioScore, ScenarioScorer, ScoreLabel};
