use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fabric_forge::config::Config;
use fabric_forge::db::{Store, TopologyStore};
use fabric_forge::expand::Expander;
use fabric_forge::ipam::{Allocator, PoolDefinition};
use fabric_forge::models::DesignTemplate;
use fabric_forge::pipeline;
use fabric_forge::render::Renderer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fabric_forge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::load();
    tracing::info!("Starting FabricForge");
    tracing::info!("Database: {}", cfg.db_path);
    tracing::info!("Design: {}", cfg.design_path);
    tracing::info!("Branch: {}", cfg.branch);

    let store = Store::new(&cfg.db_path, cfg.db_max_connections).await?;
    tracing::info!("Database initialized (pool_size={})", cfg.db_max_connections);

    if let Some(pools_path) = &cfg.pools_path {
        let data = tokio::fs::read_to_string(pools_path)
            .await
            .with_context(|| format!("Failed to read pools from {}", pools_path))?;
        let definitions: Vec<PoolDefinition> = serde_json::from_str(&data)
            .with_context(|| format!("Invalid pool definitions in {}", pools_path))?;
        store.seed_pools(&definitions).await?;
    }

    let allocator = Allocator::from_pools(store.load_pools().await?);
    tracing::info!("Loaded {} pools", allocator.pool_ids().len());

    let design = tokio::fs::read_to_string(&cfg.design_path)
        .await
        .with_context(|| format!("Failed to read design template {}", cfg.design_path))?;
    let template: DesignTemplate = serde_json::from_str(&design)
        .with_context(|| format!("Invalid design template {}", cfg.design_path))?;

    let expander = Expander::new();
    expander
        .expand_and_commit(&template, &allocator, &store, &cfg.branch)
        .await
        .with_context(|| format!("Expansion of {} failed", template.name))?;
    let batches = store.list_batches(&template.name, &cfg.branch).await?;
    tracing::info!(
        "{} on branch {} has {} committed batches",
        template.name,
        cfg.branch,
        batches.len()
    );

    let renderer = Renderer::new()?;
    let report =
        pipeline::render_topology(&store, &renderer, &template.name, &cfg.branch).await?;

    for finding in report.findings() {
        if finding.is_error() {
            tracing::error!("{}", finding);
        } else {
            tracing::warn!("{}", finding);
        }
    }

    let written = pipeline::write_artifacts(&report, &cfg.output_dir).await?;
    tracing::info!(
        "Generated {} of {} device configs for {} into {}",
        written,
        report.devices.len(),
        template.name,
        cfg.output_dir
    );

    Ok(())
}
