// src/main.rs

use anyhow::Context;
use chat_radio::cache::{CacheManager, CacheStatus};
use chat_radio::cli::Args;
use chat_radio::date::DateParser;
use chat_radio::extract::MalformedPolicy;
use chat_radio::{analyzer, renderer};
use clap::Parser;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_radio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting up...");
    let start_time = Instant::now();

    let cache_dir = match &args.cache_dir {
        Some(dir) => dir.clone(),
        None => CacheManager::default_dir()?,
    };
    let policy = if args.skip_malformed { MalformedPolicy::Skip } else { MalformedPolicy::Abort };
    let cache = CacheManager::new(cache_dir).with_policy(policy);
    let parser = DateParser::new(args.src_locale, args.timezone_table());

    let artifact = cache
        .ensure_cache(&args.filename, &parser)
        .with_context(|| format!("Failed to cache {}", args.filename.display()))?;
    match artifact.status {
        CacheStatus::Reused => println!("Using cached messages from {}", artifact.path.display()),
        CacheStatus::Built { messages, skipped } => println!(
            "Cached {} messages ({} skipped) in {}",
            messages,
            skipped,
            artifact.path.display()
        ),
    }

    let analysis = analyzer::analyze_cache(&artifact.path)
        .with_context(|| format!("Failed to analyze {}", artifact.path.display()))?;
    println!(
        "Analysis finished in {:.2?}. Found {} messages from {} users.",
        start_time.elapsed(),
        analysis.total_messages,
        analysis.users.len()
    );
    if let (Some(first), Some(last)) = (analysis.first_message, analysis.last_message) {
        println!("Conversation spans from {} to {}.", first.to_rfc2822(), last.to_rfc2822());
    }

    renderer::print_summary(&analysis, args.dst_locale);

    let render_start = Instant::now();
    let chart = renderer::render_chart(&analysis, args.dst_locale, args.width, args.height);
    renderer::save_chart(&chart, &args.output)?;
    println!("Chart written to {} in {:.2?}.", args.output.display(), render_start.elapsed());

    println!("Total time: {:.2?}", start_time.elapsed());
    Ok(())
}
