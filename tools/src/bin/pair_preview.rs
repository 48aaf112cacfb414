use anyhow::Context;
use clap::Parser;
use paired_dataset::PairedDataset;
use paired_tools::write_previews;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "pair_preview",
    about = "Draw augmented samples and write A/B preview PNGs"
)]
struct Args {
    #[command(flatten)]
    dataset: cli_support::DatasetArgs,
    /// First dataset index to draw.
    #[arg(long, default_value_t = 0)]
    start: usize,
    /// Number of samples to draw.
    #[arg(long, default_value_t = 8)]
    count: usize,
    /// Where the preview PNGs go.
    #[arg(long, default_value = "logs/pair_preview")]
    out_dir: PathBuf,
    /// Also write a JSON record per sample next to the PNGs.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    cli_support::init_tracing();
    let args = Args::parse();
    let cfg = args.dataset.resolve()?;
    info!(config = %cfg.describe(), "resolved dataset config");
    let dataset = PairedDataset::new(cfg)?;
    if dataset.is_empty() {
        anyhow::bail!(
            "no images found under {}",
            dataset.config().phase_dir().display()
        );
    }

    let records = write_previews(&dataset, args.start, args.count, &args.out_dir)?;
    for r in &records {
        info!(
            index = r.index,
            file = %r.file.display(),
            source = ?r.source_shape,
            target = ?r.target_shape,
            source_range = ?r.source_range,
            target_range = ?r.target_range,
            "preview written"
        );
    }
    if args.json {
        let path = args.out_dir.join("previews.json");
        let json = serde_json::to_vec_pretty(&records)?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    }
    println!(
        "Wrote {} preview pairs to {}",
        records.len(),
        args.out_dir.display()
    );
    Ok(())
}
