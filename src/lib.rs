pub mod aggregator;
pub mod asset_class;
pub mod cache;
pub mod config;
pub mod cycles;
pub mod engine;
pub mod error;
pub mod market_data;
pub mod model;
pub mod portfolio;
pub mod position_simulator;
pub mod scenarios;
pub mod simulation;
pub mod stats;
pub mod volatility;

pub use asset_class::AssetClass;
pub use config::EngineConfig;
pub use cycles::{CycleAdjustment, CycleAdjustmentCalculator, CyclePhaseState, CycleWeights};
pub use engine::{PortfolioProjection, ProjectionEngine, ProjectionRequest, ScenarioSelection};
pub use error::{EngineError, EngineResult, InputError};
pub use model::CycleDimension;
pub use portfolio::{MissingDataPolicy, Portfolio, Position};
pub use simulation::SimulationResult;
