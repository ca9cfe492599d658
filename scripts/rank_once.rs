//! 設定に従ってランキングを1回だけ実行し、結果を標準出力に表示する。
use std::env;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use release_radar::{
    app::{ComponentRegistry, adaptive_policy, default_request},
    config::Config,
    pipeline::{RankedReleases, record::MediaType},
    util::time::today,
};
use tracing::warn;

const EXIT_INVALID: u8 = 1;
const EXIT_ALL_COLLECTORS_FAILED: u8 = 2;

#[derive(Debug, Default)]
struct Args {
    threshold: Option<f64>,
    max_results: Option<usize>,
    media_type: Option<MediaType>,
    no_adaptive: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => return ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            print_usage();
            return ExitCode::from(EXIT_INVALID);
        }
    };

    match run(args).await {
        Ok(ranked) if ranked.all_collectors_failed() => {
            eprintln!("error: every collector failed, no releases could be fetched");
            ExitCode::from(EXIT_ALL_COLLECTORS_FAILED)
        }
        Ok(ranked) => {
            print_ranked(&ranked);
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(EXIT_INVALID)
        }
    }
}

async fn run(args: Args) -> Result<RankedReleases> {
    let config = Config::from_env().context("failed to load configuration")?;
    let registry = ComponentRegistry::build(config).context("failed to build component registry")?;
    let config = registry.config();
    let pipeline = registry.pipeline();

    if pipeline.collector_count() == 0 {
        warn!("no collectors are configured, set TMDB_API_KEY or IGDB_CLIENT_ID/IGDB_CLIENT_SECRET");
    }

    let mut request = default_request(&config, today());
    if let Some(threshold) = args.threshold {
        request.score_threshold = threshold;
    }
    if let Some(limit) = args.max_results {
        request.max_results = Some(limit);
    }
    if let Some(media_type) = args.media_type {
        request = request.with_media_type(media_type);
    }

    let policy = if args.no_adaptive {
        None
    } else {
        adaptive_policy(&config)
    };
    let ranked = match policy {
        Some(policy) => pipeline.rank_adaptive(&request, &policy).await?,
        None => pipeline.rank(&request).await?,
    };
    Ok(ranked)
}

fn print_ranked(ranked: &RankedReleases) {
    println!(
        "Window: {} .. {} (threshold {:.1}, attempts {})",
        ranked.window.start(),
        ranked.window.end(),
        ranked.score_threshold,
        ranked.attempts
    );

    if ranked.releases.is_empty() {
        println!("No wake-up-babe moments found.");
        return;
    }

    for (index, release) in ranked.releases.iter().enumerate() {
        println!();
        println!("#{} {}", index + 1, release.title);
        println!("  Type: {}", release.media_type().label());
        println!("  Release Date: {}", release.release_date);
        println!("  Excitement Score: {:.1}", release.score());
        if let Some(platforms) = release.details.platforms().filter(|set| !set.is_empty()) {
            let joined: Vec<&str> = platforms.iter().map(String::as_str).collect();
            println!("  Platforms: {}", joined.join(", "));
        }
        if let Some(cover) = release.details.cover_url() {
            println!("  Cover: {cover}");
        }
    }
}

fn parse_args() -> Result<Option<Args>> {
    let mut parsed = Args::default();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--threshold" => {
                let value = args.next().context("--threshold requires a number")?;
                parsed.threshold = Some(
                    value
                        .parse::<f64>()
                        .context("--threshold must be a number")?,
                );
            }
            "--max-results" => {
                let value = args.next().context("--max-results requires a count")?;
                parsed.max_results = Some(
                    value
                        .parse::<usize>()
                        .context("--max-results must be an integer")?,
                );
            }
            "--media-type" => {
                let value = args
                    .next()
                    .context("--media-type requires movie, tv or game")?;
                parsed.media_type = Some(
                    value
                        .parse::<MediaType>()
                        .context("--media-type must be movie, tv or game")?,
                );
            }
            "--no-adaptive" => {
                parsed.no_adaptive = true;
            }
            "--help" => {
                print_usage();
                return Ok(None);
            }
            _ => {
                bail!("unknown argument: {}", arg);
            }
        }
    }

    Ok(Some(parsed))
}

fn print_usage() {
    eprintln!(
        "Usage: rank_once [--threshold <score>] [--max-results <n>] \
         [--media-type movie|tv|game] [--no-adaptive]\n\n\
         Credentials and defaults are read from the environment \
         (TMDB_API_KEY, IGDB_CLIENT_ID, IGDB_CLIENT_SECRET, SCORE_THRESHOLD, ...)."
    );
}
