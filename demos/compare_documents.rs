//! Compare two renderings of the same certificate.
//!
//! Run with: cargo run --example compare_documents -- <first> <second> [config.json] [output_dir]
//!
//! Without a config file the stub embedder is used, so no model weights are needed.

use doc_forensics::{
    DocumentKind, DocumentLoader, DocumentVerifier, EmbedderConfig, VerificationConfig,
    detection::tampering::RegionOutcome,
    error::Result,
    report::{JsonReport, visualization::Visualizer},
};
use std::env;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        println!("Usage: {} <first_image> <second_image> [config.json] [output_dir]", args[0]);
        return Ok(());
    }

    let config = match args.get(3) {
        Some(path) => VerificationConfig::from_json_file(path)?.with_env_overrides()?,
        None => VerificationConfig {
            embedder: EmbedderConfig::stub(),
            ..Default::default()
        },
    };
    let output_dir = args.get(4).map(|s| s.as_str()).unwrap_or("./output");

    let loader = DocumentLoader::new();
    let first = loader.load(&std::fs::read(&args[1])?, DocumentKind::Scanned)?;
    let second = loader.load(&std::fs::read(&args[2])?, DocumentKind::Scanned)?;
    println!(
        "Loaded {}x{} and {}x{}",
        first.width(),
        first.height(),
        second.width(),
        second.height()
    );

    let verifier = DocumentVerifier::from_config(config)?;

    let whole = verifier.compare_whole(&first, &second)?;
    println!("Whole-page similarity: {:.4} (same: {})", whole.similarity, whole.is_same);
    println!();

    let result = verifier.verify(&first, &second);
    for verdict in result.regions() {
        match &verdict.outcome {
            RegionOutcome::Compared(comparison) => {
                let s = &comparison.similarity;
                println!(
                    "  {:<10} embedding {:>8} keypoints {:>8}  {}",
                    verdict.label.to_string(),
                    s.embedding_score.map_or("n/a".into(), |v| format!("{:.3}", v)),
                    s.keypoint_score.map_or("n/a".into(), |v| format!("{:.3}", v)),
                    if s.is_match() { "match" } else { "MISMATCH" }
                );
            }
            RegionOutcome::NotDetected(missing) => {
                println!("  {:<10} not detected ({:?})", verdict.label.to_string(), missing);
            }
        }
    }
    println!();
    println!("{}", result.summary());

    let rendered = Visualizer::new().render(&first, &second, &result);
    rendered.save_all(output_dir)?;
    println!("Annotated images saved to: {}/", output_dir);

    match JsonReport::from(&result).to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Could not serialize report: {}", e),
    }

    Ok(())
}
