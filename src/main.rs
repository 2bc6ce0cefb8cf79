use anyhow::{Context, Result, bail};
use cycle_projection::cache::{ResultCache, SqliteCacheStore};
use cycle_projection::engine::{
    PortfolioProjection, ProjectionEngine, ProjectionRequest, ScenarioEvaluation,
};
use cycle_projection::market_data::JsonDirPriceSource;
use cycle_projection::EngineConfig;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;

/// Request file: a projection plus optional analog queries to score
#[derive(Debug, Deserialize)]
struct RunRequest {
    #[serde(flatten)]
    projection: ProjectionRequest,
    #[serde(default)]
    evaluate: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RunReport {
    projection: PortfolioProjection,
    from_cache: bool,
    evaluations: Vec<ScenarioEvaluation>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger with default info level if RUST_LOG not set
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info"); }
    }
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let (config_file, request_file) = match args.as_slice() {
        [request] => ("config.json", request.as_str()),
        [config, request] => (config.as_str(), request.as_str()),
        _ => bail!("usage: cycle-projection [config.json] <request.json>"),
    };

    info!("Loading configuration from: {}", config_file);
    let config = EngineConfig::load_from_file(config_file)?;

    let raw = std::fs::read_to_string(request_file)
        .with_context(|| format!("reading request {}", request_file))?;
    let request: RunRequest = serde_json::from_str(&raw)
        .with_context(|| format!("parsing request {}", request_file))?;

    let source = Arc::new(JsonDirPriceSource::new(&config.data.price_dir));
    let sqlite_path = config.cache.sqlite_path.clone();
    let model_version = config.cache.model_version;
    let engine = ProjectionEngine::new(config, source)?;

    let (projection, from_cache, evaluations) = match sqlite_path {
        Some(path) => {
            let store = Arc::new(SqliteCacheStore::open(&path)?);
            let cache = ResultCache::new(store, model_version);
            if let Err(e) = cache.purge_stale().await {
                warn!("Could not purge stale cache entries: {}", e);
            }

            let (projection, computed) =
                engine.project_cached(&request.projection, &cache).await?;
            let mut evaluations = Vec::with_capacity(request.evaluate.len());
            for query in &request.evaluate {
                let (evaluation, _) = engine
                    .evaluate_scenario_cached(
                        &request.projection.portfolio_id,
                        query,
                        &request.projection.positions,
                        request.projection.horizon_years,
                        &cache,
                    )
                    .await?;
                evaluations.push(evaluation);
            }
            (projection, !computed, evaluations)
        }
        None => {
            let projection = engine.project(&request.projection).await?;
            let mut evaluations = Vec::with_capacity(request.evaluate.len());
            for query in &request.evaluate {
                let evaluation = engine
                    .evaluate_scenario(
                        query,
                        &request.projection.positions,
                        request.projection.horizon_years,
                    )
                    .await
                    .with_context(|| format!("evaluating scenario '{}'", query))?;
                evaluations.push(evaluation);
            }
            (projection, false, evaluations)
        }
    };

    let report = RunReport {
        projection,
        from_cache,
        evaluations,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
