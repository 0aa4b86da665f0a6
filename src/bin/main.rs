use financial_query_agent::{
    agent::Orchestrator,
    planner::RulePlanner,
    state::{FileSessionStore, InMemorySessionStore, SessionStore},
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    dotenv::dotenv().ok();

    info!("Financial Query Agent starting");

    let store: Arc<dyn SessionStore> = match std::env::var("SESSION_DIR") {
        Ok(dir) => Arc::new(FileSessionStore::new(dir)),
        Err(_) => Arc::new(InMemorySessionStore::new()),
    };

    let orchestrator = Orchestrator::new(Box::new(RulePlanner), store);
    let session_id = Uuid::new_v4();

    let queries = [
        "Compare ROI for AAPL for the last two quarters",
        "Adjust those ROI figures for inflation at the published rate",
        "Show them as a bar chart",
    ];

    for query in queries {
        info!(%session_id, query, "Running turn");

        let turn = orchestrator.run_turn(session_id, query, None).await?;

        println!("\n=== TURN RESULT ===");
        println!("{}", serde_json::to_string_pretty(&turn.plan)?);
        if !turn.notes.is_empty() {
            println!("\nNotes:");
            for (i, note) in turn.notes.iter().enumerate() {
                println!("  {}: {}", i + 1, note);
            }
        }
        if let Some(failure) = &turn.failure {
            eprintln!("Turn ended early: {:?}", failure);
        }
    }

    Ok(())
}
