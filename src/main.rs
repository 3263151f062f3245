mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ferrite_cnn=info,train_model=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.train_config()?;
    if let Some(path) = &cli.dump_config {
        config
            .save_json(path)
            .with_context(|| format!("writing config {}", path.display()))?;
    }

    tracing::info!(
        "Training on {} (validation {})",
        config.train_records.display(),
        config.val_records.display()
    );
    let history = ferrite_cnn::run_training(&config).context("training failed")?;

    if let (Some(loss), Some(accuracy)) = (history.val_loss.last(), history.val_accuracy.last()) {
        tracing::info!(
            "Finished after {} epochs - val_loss: {:.4} - val_accuracy: {:.4}",
            history.epochs(),
            loss,
            accuracy
        );
    }
    Ok(())
}
