//! CLI command implementations

use super::http::{run_http_server, AppState};
use crate::config::Config;
use crate::pipeline::{PipelineCoordinator, Query};
use crate::routing::Category;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};

fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load_or_default_path(path).context("Failed to load configuration")
}

/// Start the HTTP server. `host`/`port` override the config file.
pub async fn run_serve(host: Option<String>, port: Option<u16>, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let coordinator = PipelineCoordinator::from_config(&config)?;
    for route in coordinator.routes().routes() {
        tracing::info!("Route {} -> {}", route.category, route.endpoint);
    }

    let state = Arc::new(AppState::new(Arc::new(coordinator)));
    run_http_server(&host, port, state).await
}

/// Run one query through the pipeline and print the outcome
pub async fn run_ask(query: &str, config: Option<&Path>, format: &str) -> Result<()> {
    let config = load_config(config)?;
    let coordinator = PipelineCoordinator::from_config(&config)?;
    let run = coordinator.run(Query::new(query)).await;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
        _ => {
            for sub_query in &run.sub_queries {
                println!(
                    "{} {}",
                    format!("[{}]", sub_query.category).cyan(),
                    sub_query.text
                );
            }
            if !run.sub_queries.is_empty() {
                println!();
            }
            match &run.final_answer {
                Some(answer) => println!("{}", answer),
                None => println!(
                    "{} {}",
                    "Pipeline failed:".red().bold(),
                    run.error.as_deref().unwrap_or("unknown error")
                ),
            }
        }
    }

    if run.is_done() {
        Ok(())
    } else {
        anyhow::bail!("Pipeline run {} did not complete", run.id)
    }
}

/// Print the configured category routes
pub fn run_routes(config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;

    #[derive(Tabled)]
    struct RouteRow {
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Endpoint")]
        endpoint: String,
    }

    let rows: Vec<RouteRow> = Category::ALL
        .iter()
        .map(|&category| RouteRow {
            category: category.to_string(),
            endpoint: config
                .model_routes
                .get(category)
                .unwrap_or("(not configured)")
                .to_string(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);

    crate::routing::RouteTable::from_config(&config.model_routes)
        .context("Route table is incomplete")?;
    println!("{}", "All categories are routed".green());
    Ok(())
}
