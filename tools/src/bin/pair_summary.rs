use clap::Parser;
use paired_dataset::summarize_pairs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pair_summary",
    about = "Check every combined image under a root and report decode problems"
)]
struct Args {
    #[command(flatten)]
    dataset: cli_support::DatasetArgs,
    /// Scan this directory instead of <dataroot>/<phase>.
    #[arg(long)]
    root: Option<PathBuf>,
    /// Print the summary as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
    /// Exit non-zero when any file fails to decode.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

fn main() -> anyhow::Result<()> {
    cli_support::init_tracing();
    let args = Args::parse();
    let root = match &args.root {
        Some(root) => root.clone(),
        None => args.dataset.resolve()?.phase_dir(),
    };
    let summary = summarize_pairs(&root)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{}: total={} decoded={} failed={} odd_width={} with_alpha={}",
            summary.root.display(),
            summary.total,
            summary.decoded,
            summary.failed,
            summary.odd_width,
            summary.with_alpha
        );
        for path in &summary.failures {
            println!(" - failed: {}", path.display());
        }
    }
    if args.strict && summary.failed > 0 {
        anyhow::bail!("{} file(s) failed to decode", summary.failed);
    }
    Ok(())
}
