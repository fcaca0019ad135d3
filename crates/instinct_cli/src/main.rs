use clap::{Parser, Subcommand};
use instinct_core::tools::ToolRegistry;
use instinct_core::{Domain, EngineConfig, NewInstinct, Source};
use instinct_memory::{register_management_tools, BehaviorEngine, ListFilter, TurnContext};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod repl;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "instinct.toml")]
    config: String,

    /// Override the database path from the config
    #[arg(long, env = "INSTINCT_DB")]
    db: Option<String>,

    /// Conversation context to operate on
    #[arg(short = 'C', long, default_value = "cli")]
    context: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive session: every line is a user turn
    Repl,
    /// List instincts with decayed confidence
    List {
        #[arg(long)]
        all: bool,
        #[arg(long)]
        domain: Option<Domain>,
    },
    /// Aggregate counts for the context
    Summary,
    /// Create an instinct
    Create {
        #[arg(long)]
        domain: Domain,
        #[arg(long)]
        trigger: String,
        #[arg(long)]
        action: String,
        #[arg(long, default_value_t = 0.8)]
        confidence: f32,
        #[arg(long, default_value = "explicit-user")]
        source: Source,
    },
    /// Add a delta to an instinct's base confidence
    Adjust {
        id: Uuid,
        #[arg(allow_hyphen_values = true)]
        delta: f32,
    },
    Enable { id: Uuid },
    Disable {
        id: Uuid,
        #[arg(long, default_value = "disabled from cli")]
        reason: String,
    },
    /// Print the guidance digest for a turn
    Guidance {
        text: String,
        /// Seed for the inclusion gate; random when omitted
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Disable stale instincts in every context
    Cleanup,
    /// Replay the log and rewrite the snapshot
    Rebuild,
    Export {
        #[arg(long)]
        out: Option<String>,
    },
    Import { file: String },
    /// Seed the context from a built-in profile
    Profile {
        id: String,
        #[arg(long)]
        clear: bool,
    },
    /// Call a management tool with a JSON input
    Tool { name: String, input: String },
    /// Print the management tool schemas
    Tools,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn gate_rng(seed: Option<u64>) -> Box<dyn RngCore> {
    match seed {
        Some(s) => Box::new(StdRng::seed_from_u64(s)),
        None => Box::new(StdRng::from_entropy()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.log_json);

    let mut config = EngineConfig::load_or_default(&args.config)?;
    if let Some(db) = &args.db {
        config.storage.db_path = db.clone();
    }
    info!("Opening instinct store at {}...", config.storage.db_path);
    let engine = Arc::new(BehaviorEngine::open(&config).await?);
    let ctx = args.context.as_str();
    let store = engine.store();

    match args.command {
        Command::Repl => repl::run(engine.clone(), ctx).await?,
        Command::List { all, domain } => {
            let mut filter = if all { ListFilter::all() } else { ListFilter::active() };
            if let Some(d) = domain {
                filter = filter.in_domain(d);
            }
            for s in store.list(ctx, &filter).await? {
                println!(
                    "{} [{}] {:.2} ({}x, {}) {} -> {}",
                    s.instinct.id,
                    s.instinct.domain,
                    s.confidence,
                    s.instinct.occurrence_count,
                    s.instinct.status,
                    s.instinct.trigger,
                    s.instinct.action
                );
            }
        }
        Command::Summary => {
            println!("{}", serde_json::to_string_pretty(&store.summary(ctx).await?)?);
        }
        Command::Create { domain, trigger, action, confidence, source } => {
            let created = store.create(ctx, NewInstinct::new(domain, trigger, action, source, confidence)).await?;
            println!("{}", created.id);
        }
        Command::Adjust { id, delta } => {
            let updated = store.adjust_confidence(ctx, id, delta).await?;
            println!("{:.2}", updated.base_confidence);
        }
        Command::Enable { id } => {
            let changed = store.enable(ctx, id).await?;
            println!("{}", if changed { "enabled" } else { "already enabled" });
        }
        Command::Disable { id, reason } => {
            let changed = store.disable(ctx, id, &reason).await?;
            println!("{}", if changed { "disabled" } else { "already disabled" });
        }
        Command::Guidance { text, seed } => {
            let mut rng = gate_rng(seed);
            let digest = engine.guidance(ctx, &TurnContext::new(text), &mut *rng).await?;
            print!("{}", digest.render());
        }
        Command::Cleanup => {
            println!("{} instincts disabled", engine.cleanup_stale().await?);
        }
        Command::Rebuild => {
            let snapshot = store.rebuild_snapshot(ctx).await?;
            println!("rebuilt '{}' at seq {} ({} instincts)", ctx, snapshot.last_seq, snapshot.len());
        }
        Command::Export { out } => {
            let json = store.export(ctx).await?;
            match out {
                Some(path) => std::fs::write(&path, json)?,
                None => println!("{}", json),
            }
        }
        Command::Import { file } => {
            let json = std::fs::read_to_string(&file)?;
            println!("{} instincts imported", store.import(ctx, &json).await?);
        }
        Command::Profile { id, clear } => {
            println!("{} instincts created", store.apply_profile(ctx, &id, clear).await?);
        }
        Command::Tool { name, input } => {
            let mut registry = ToolRegistry::new();
            register_management_tools(&mut registry, engine.clone());
            let input: serde_json::Value = serde_json::from_str(&input)?;
            let outcome = registry.dispatch(&name, &input).await;
            println!("{}", outcome.content);
            if outcome.is_error {
                anyhow::bail!("tool {} failed ({:?})", name, outcome.error_kind);
            }
        }
        Command::Tools => {
            let mut registry = ToolRegistry::new();
            register_management_tools(&mut registry, engine.clone());
            println!("{}", serde_json::to_string_pretty(&registry.available_tools())?);
        }
    }

    Ok(())
}
