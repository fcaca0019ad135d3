use instinct_memory::{BehaviorEngine, TurnBoundary, TurnContext};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::error;

/// Read user turns from stdin and show what the engine learned and would inject.
pub async fn run(engine: Arc<BehaviorEngine>, context_id: &str) -> anyhow::Result<()> {
    println!("Instinct REPL on context '{}'. Type 'quit' to exit, 'summary' for counts.", context_id);
    let mut rng = StdRng::from_entropy();
    let stdin = io::stdin();
    let mut input = String::new();

    loop {
        print!("> ");
        io::stdout().flush()?;
        input.clear();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let trimmed = input.trim();

        if trimmed == "quit" || trimmed == "exit" {
            break;
        }
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "summary" {
            let summary = engine.store().summary(context_id).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            continue;
        }

        match engine.on_turn(TurnBoundary::user(context_id, trimmed)).await {
            Ok(obs) => {
                for d in &obs.detections {
                    println!("  {:?} -> {:?} {}", d.kind, d.applied, d.instinct_id);
                }
                if let Some(outcome) = &obs.outcome {
                    println!("  outcome success={} updated={}", outcome.success, outcome.updated);
                }
                println!("  mood: {}", obs.transition.state());
            }
            Err(e) => {
                error!("Observation failed: {}", e);
                println!("\n[Error]: {}\n", e);
                continue;
            }
        }

        match engine.guidance(context_id, &TurnContext::new(trimmed), &mut rng).await {
            Ok(digest) if !digest.is_empty() => println!("\n{}", digest.render()),
            Ok(_) => {}
            Err(e) => error!("Guidance failed: {}", e),
        }
    }

    Ok(())
}
