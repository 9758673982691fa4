use anyhow::{Context, Result};
use clap::Parser;
use eval::{EvalReport, EvalRunner, HttpAnalyzeClient, load_samples};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Replay labeled questions against a running analysis service.
#[derive(Parser)]
#[command(name = "run_eval")]
struct Args {
    /// Base URL of the service.
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    api_url: String,

    /// Line-delimited JSON evaluation samples.
    #[arg(long, default_value = "datasets/shoes/eval_samples.jsonl")]
    samples: PathBuf,

    /// Where to write the detailed report.
    #[arg(long, default_value = "evaluation_results/latest_run.json")]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    println!("=== Evaluation ===\n");

    let samples = load_samples(&args.samples)?;
    println!("Samples: {} from {}\n", samples.len(), args.samples.display());

    let runner = EvalRunner::new(HttpAnalyzeClient::new(&args.api_url));
    let report = runner.run(&samples).await;

    if let Some(dir) = args.out.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let report_json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&args.out, report_json)
        .with_context(|| format!("Failed to write {}", args.out.display()))?;
    println!("Detailed results saved to {}\n", args.out.display());

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &EvalReport) {
    println!("=== SUMMARY ===\n");

    if report.total == 0 {
        println!("No samples were evaluated.");
        return;
    }

    println!("  Total Samples: {}", report.total);
    println!("  Passed: {}", report.passed);
    println!("  Failed/Errored: {}", report.failed);
    println!("  Skipped: {}", report.skipped);
    if report.evaluated > 0 {
        println!("  Accuracy (on evaluated samples): {:.2}%", report.accuracy);
    } else {
        println!("  No samples were evaluated (all were skipped).");
    }
    println!("  Avg Latency: {:.0} ms\n", report.avg_latency_ms);

    println!("{:<5} {:<12} {:<8} REASON", "#", "SKU", "PASS");
    for result in &report.results {
        let pass = match result.evaluation.pass {
            Some(true) => "yes",
            Some(false) => "no",
            None => "skip",
        };
        println!(
            "{:<5} {:<12} {:<8} {}",
            result.sample_index, result.payload.sku, pass, result.evaluation.reason
        );
    }
}
