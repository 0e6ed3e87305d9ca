use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use scenegraph_context::{Intent, IntentOutcome, LoggingSink, SceneRuntime};
use scenegraph_core::SceneConfig;
use scenegraph_graph::BootstrapDoc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Load a scene, let the agents negotiate for a few ticks, then answer
/// spatial questions against the committed graph.
#[derive(Parser, Debug)]
#[command(name = "scenegraph-demo", version, about)]
struct Args {
    /// Bootstrap scene JSON.
    bootstrap: PathBuf,

    /// Number of ticks to run before answering questions.
    #[arg(long, default_value_t = 3)]
    ticks: u64,

    /// Questions to ask (repeatable).
    #[arg(long = "ask")]
    questions: Vec<String>,

    /// Intent JSON values to apply before the final ticks (repeatable).
    #[arg(long = "intent")]
    intents: Vec<String>,

    /// Print the full spatial snapshot as JSON at the end.
    #[arg(long)]
    snapshot: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let doc = BootstrapDoc::from_path(&args.bootstrap)
        .with_context(|| format!("loading bootstrap {}", args.bootstrap.display()))?;

    let runtime = SceneRuntime::new(SceneConfig::default());
    runtime.add_sink(Arc::new(LoggingSink));
    runtime.load_bootstrap(&doc).await?;
    println!("[{}] scene loaded from {}", Utc::now(), args.bootstrap.display());

    for _ in 0..args.ticks {
        let batch = runtime.tick().await?;
        println!("tick {}: {} events", batch.tick, batch.events.len());
    }

    for raw in &args.intents {
        let intent: Intent =
            serde_json::from_str(raw).with_context(|| format!("parsing intent {raw}"))?;
        match runtime.apply_intent(&intent).await? {
            IntentOutcome::Committed(batch) => {
                println!("intent committed: {} events", batch.events.len())
            }
            IntentOutcome::Answered(answer) => println!("{}", answer.answer_text),
        }
        let batch = runtime.tick().await?;
        println!("tick {}: {} events", batch.tick, batch.events.len());
    }

    for question in &args.questions {
        let answer = runtime.ask(question).await?;
        println!(
            "\nQ: {}\n[{} | confidence {:.2}]\n{}",
            question, answer.question_type, answer.confidence, answer.answer_text
        );
    }

    if args.snapshot {
        println!("{}", serde_json::to_string_pretty(&runtime.snapshot())?);
    }
    Ok(())
}
