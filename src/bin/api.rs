use financial_query_agent::{
    agent::Orchestrator,
    api::start_server,
    planner::{GeminiPlanner, Planner, RulePlanner},
    state::{FileSessionStore, InMemorySessionStore, SessionStore},
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Financial Query Agent - API Server");
    info!("Port: {}", api_port);

    // Without an API key the deterministic rules planner keeps the server
    // fully functional.
    let planner: Box<dyn Planner> = match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.is_empty() => {
            info!("Using Gemini planner");
            Box::new(GeminiPlanner::new(key))
        }
        _ => {
            info!("GEMINI_API_KEY not set; using rules planner");
            Box::new(RulePlanner)
        }
    };

    let store: Arc<dyn SessionStore> = match std::env::var("SESSION_DIR") {
        Ok(dir) => {
            info!("Persisting sessions under {}", dir);
            Arc::new(FileSessionStore::new(dir))
        }
        Err(_) => Arc::new(InMemorySessionStore::new()),
    };

    let orchestrator = Arc::new(Orchestrator::new(planner, store));

    info!("Orchestrator initialized");

    start_server(orchestrator, api_port).await?;

    Ok(())
}
