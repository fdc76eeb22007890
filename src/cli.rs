use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Mirror a help center into an offline output directory.
    Crawl(CrawlArgs),
    /// Print discovered sections as JSON lines.
    Discover(DiscoverArgs),
    /// Rebuild links and the index of an existing output directory.
    Assemble(AssembleArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Source {
    /// Discover sections by scraping the home and category pages.
    Pages,
    /// List articles through the metadata API, falling back to pages.
    Api,
}

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// Home page URL (must be http/https).
    #[arg(long)]
    pub url: String,

    /// Output directory.
    #[arg(long)]
    pub out: String,

    /// Articles extracted in parallel.
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Pause after each page request, per worker.
    #[arg(long, default_value_t = 500)]
    pub delay_ms: u64,

    /// Per-request timeout.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Skip articles that already have a page in the output directory.
    #[arg(long)]
    pub resume: bool,

    /// Also download images hosted on third-party image hosts.
    #[arg(long)]
    pub try_external_images: bool,

    /// YAML site profile overriding the built-in selectors and tables.
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Where the list of sections and articles comes from.
    #[arg(long, value_enum, default_value_t = Source::Pages)]
    pub source: Source,

    /// Stop scheduling after this many articles.
    #[arg(long)]
    pub max_articles: Option<usize>,
}

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Home page URL (must be http/https).
    #[arg(long)]
    pub url: String,

    /// YAML site profile overriding the built-in selectors and tables.
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Per-request timeout.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Pause after each page request.
    #[arg(long, default_value_t = 500)]
    pub delay_ms: u64,
}

#[derive(Debug, Args)]
pub struct AssembleArgs {
    /// Output directory written by `crawl`.
    #[arg(long)]
    pub out: String,

    /// YAML site profile (category order, catch-all bucket, site title).
    #[arg(long)]
    pub profile: Option<PathBuf>,
}
