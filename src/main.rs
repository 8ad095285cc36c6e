use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use feedcast::config::Config;
use feedcast::feed::{pipeline, HtmlTemplate, UpdateOutcome};
use feedcast::store::FeedStore;

/// Raw content files larger than this are rejected (10MB)
const MAX_CONTENT_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "feedcast", about = "Render syndicated feeds into cached HTML fragments")]
struct Args {
    /// Feed configuration file (TOML)
    #[arg(long, short, value_name = "FILE")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration, templates and preprocessing parameters
    Check,

    /// Feed local files through the pipeline and print the cached renders
    Render {
        /// Raw content for a feed, as NAME=PATH (repeatable)
        #[arg(long = "input", value_name = "NAME=PATH", required = true)]
        inputs: Vec<String>,

        /// Print feed views as JSON
        #[arg(long)]
        json: bool,
    },
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }
    Config::load(path).with_context(|| format!("Failed to load config '{}'", path.display()))
}

fn check(config: &Config) -> Result<()> {
    let mut problems = 0usize;

    for feed in &config.feeds {
        let item = HtmlTemplate::item(&feed.html_feed_item_entry_template)
            .map(|_| ())
            .context("item template");
        let wrapper = feed
            .html_wrapper
            .as_deref()
            .map(HtmlTemplate::wrapper)
            .transpose()
            .map(|_| ())
            .context("wrapper template");
        // Parameter errors surface even with no items to transform
        let actions = pipeline::run(&feed.preprocessing_actions, Vec::new())
            .map(|_| ())
            .context("preprocessing actions");

        let errors: Vec<anyhow::Error> = [item, wrapper, actions]
            .into_iter()
            .filter_map(Result::err)
            .collect();
        if errors.is_empty() {
            println!("ok    {}", feed.name);
        } else {
            for e in errors {
                println!("error {}: {:#}", feed.name, e);
                problems += 1;
            }
        }
    }

    if problems > 0 {
        anyhow::bail!("{} problem(s) found in {} feed(s)", problems, config.feeds.len());
    }
    println!("{} feed(s) valid", config.feeds.len());
    Ok(())
}

fn read_input(input: &str) -> Result<(String, String)> {
    let (name, path) = input
        .split_once('=')
        .with_context(|| format!("Input '{}' must be NAME=PATH", input))?;
    let path = Path::new(path);

    let meta = std::fs::metadata(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    if meta.len() > MAX_CONTENT_SIZE {
        anyhow::bail!(
            "Input file '{}' is {} bytes (max {} bytes)",
            path.display(),
            meta.len(),
            MAX_CONTENT_SIZE
        );
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    Ok((name.to_string(), raw))
}

async fn render(config: &Config, inputs: &[String], json: bool) -> Result<()> {
    let store = FeedStore::from_config(config).context("Failed to build feed store")?;

    let batch = inputs
        .iter()
        .map(|input| read_input(input))
        .collect::<Result<Vec<_>>>()?;

    let mut failures = 0usize;
    for refresh in store.update_all(batch).await {
        match refresh.result {
            Ok(UpdateOutcome::Changed { items, version }) => {
                eprintln!("{}: changed ({} items, {})", refresh.name, items, version);
            }
            Ok(UpdateOutcome::Unchanged) => eprintln!("{}: unchanged", refresh.name),
            Err(e) => {
                eprintln!("{}: failed: {}", refresh.name, e);
                failures += 1;
            }
        }
    }

    let views = store.read_all();
    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else {
        for view in &views {
            println!("<!-- {} {} -->", view.name, view.version_suffix);
            println!("{}", view.html);
        }
    }

    if failures > 0 {
        anyhow::bail!("{} feed update(s) failed", failures);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args.config)?;

    match args.command {
        Command::Check => check(&config),
        Command::Render { inputs, json } => render(&config, &inputs, json).await,
    }
}
