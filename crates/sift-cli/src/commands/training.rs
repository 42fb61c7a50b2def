//! Classifier training command implementation

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use sift_core::{ConfigPaths, Database, EngineConfig, TrainingDataGenerator};

pub fn cmd_train(
    db: &Database,
    paths: &ConfigPaths,
    output: Option<&Path>,
    export: Option<&Path>,
) -> Result<()> {
    println!("🧠 Training naive Bayes classifier...");

    let generator = TrainingDataGenerator::new(db);

    if let Some(export) = export {
        let file = File::create(export)
            .with_context(|| format!("Failed to create {}", export.display()))?;
        let mut writer = BufWriter::new(file);
        let stats = generator.export_jsonl(&mut writer)?;
        writer.flush()?;
        println!(
            "   Exported {} examples to {}",
            stats.total_examples,
            export.display()
        );
    }

    let (model, stats) = generator.train()?;
    if model.is_empty() {
        println!("⚠️  No labeled transactions yet.");
        println!();
        println!("Training data comes from:");
        println!("  - Transactions categorized by rules");
        println!("  - Your overrides (sift override <key> <category>)");
        return Ok(());
    }

    let path = match output {
        Some(path) => path.to_path_buf(),
        None => {
            let config = EngineConfig::load(paths.engine.as_deref())?;
            config
                .classifier
                .resolved_model_path()
                .context("No model path configured and no data directory available")?
        }
    };
    model
        .save(&path)
        .with_context(|| format!("Failed to write model to {}", path.display()))?;

    println!();
    println!("📊 Training Results");
    println!("   ─────────────────────────────");
    println!("   Examples:        {}", stats.total_examples);
    println!("   From overrides:  {}", stats.from_overrides);
    println!("   From rules:      {}", stats.from_rules);
    println!("   Labels:          {}", stats.labels);
    println!();
    println!("✅ Model saved to {}", path.display());
    println!("   Run 'sift recategorize' to apply it to uncategorized transactions.");

    Ok(())
}
