//! CLI entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use serp_harvester::pipeline::Pipeline;
use serp_harvester::AppConfig;

#[derive(Parser)]
#[command(
    name = "serp-harvester",
    version,
    about = "Harvest sponsored search results and browse them like a human"
)]
struct Cli {
    /// Config file (JSON); missing file means defaults
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest sponsored URLs per keyword, then visit them with rotated activity
    Harvest {
        /// Keywords CSV (column: keyword/Keyword/KW)
        #[arg(long)]
        keywords: Option<String>,

        /// Pagination cap per keyword
        #[arg(long)]
        max_pages: Option<u32>,

        /// Run Chrome headless
        #[arg(long)]
        headless: bool,

        /// Proxy endpoint (host:port:user:pass or URL form)
        #[arg(long)]
        proxy: Option<String>,

        /// Fresh browser session per keyword
        #[arg(long)]
        session_per_keyword: bool,
    },
    /// Check a URL list for lead-generation contact forms
    Forms {
        /// URL CSV (column: url)
        #[arg(long)]
        urls: Option<String>,

        /// Run Chrome headless
        #[arg(long)]
        headless: bool,

        /// Proxy endpoint (host:port:user:pass or URL form)
        #[arg(long)]
        proxy: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = serp_harvester::init_logging();

    let mut config = AppConfig::load(&cli.config);

    let summary = match cli.command {
        Command::Harvest {
            keywords,
            max_pages,
            headless,
            proxy,
            session_per_keyword,
        } => {
            if let Some(keywords) = keywords {
                config.keywords_csv = keywords;
            }
            if let Some(max_pages) = max_pages {
                config.max_pages_per_keyword = max_pages;
            }
            if headless {
                config.headless = true;
            }
            if let Some(proxy) = proxy {
                config.proxy = Some(proxy);
            }
            if session_per_keyword {
                config.session_per_keyword = true;
            }

            let pipeline = Pipeline::new(config)?;
            pipeline.run_harvest().await?
        }
        Command::Forms {
            urls,
            headless,
            proxy,
        } => {
            if let Some(urls) = urls {
                config.urls_csv = urls;
            }
            if headless {
                config.headless = true;
            }
            if let Some(proxy) = proxy {
                config.proxy = Some(proxy);
            }

            let pipeline = Pipeline::new(config)?;
            pipeline.run_form_scan().await?
        }
    };

    info!("Done! {}", summary);
    println!("Done! {summary}");
    Ok(())
}
