//! topics-attest — entry point.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use topics_attest::{
    AttestationResolver, CrawlOutput, Domain, HttpFetcher, NoCache, ScriptCheck, SqliteCache,
};
use topics_attest_cli::analyze::{analyze, csv_line, extract_domains, AnalysisOutput};
use topics_attest_cli::config::{
    resolve_allow_list_path, CacheTier, Settings, DEFAULT_OUTFILE, DEFAULT_SERVICE_ADDR,
    DEFAULT_SERVICE_DB,
};
use topics_attest_cli::{CacheService, OperationLog};

#[derive(Parser)]
#[command(
    name = "topics-attest",
    about = "Correlate Topics API usage in crawl output with Privacy Sandbox attestations",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Timeout in seconds for every network fetch.
    #[arg(long, global = true, default_value_t = 5)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one crawl output file.
    Analyze {
        /// Crawl output JSON.
        infile: PathBuf,

        /// Where to write the analysis.
        #[arg(short, long, default_value = DEFAULT_OUTFILE)]
        outfile: PathBuf,

        /// Pretty-print the output JSON.
        #[arg(long)]
        pretty: bool,

        /// Shared cache service URL.
        /// Also reads from TOPICS_ATTEST_CACHE_URL env var.
        #[arg(long)]
        cache_url: Option<String>,

        /// Local SQLite cache file.
        /// Also reads from TOPICS_ATTEST_CACHE_DB env var.
        #[arg(long)]
        cache_db: Option<String>,

        /// Do not cache attestation outcomes at all.
        #[arg(long, conflicts_with_all = ["cache_url", "cache_db"])]
        no_cache: bool,

        /// Allow-list of enrolled domains (`.dat` preload file or one domain per line).
        /// Also reads from TOPICS_ATTEST_ALLOW_LIST env var.
        #[arg(long)]
        allow_list: Option<String>,

        /// Fetch JavaScript responses and look for the API call.
        #[arg(long)]
        check_scripts: bool,

        /// Match the API call in scripts case-insensitively.
        #[arg(long, requires = "check_scripts")]
        case_insensitive_scripts: bool,

        /// Append operation messages to this JSONL file.
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Fetch and validate the attestation file of a single domain.
    Attest {
        domain: String,
    },

    /// Print the registrable domains contacted after the consent banner was clicked.
    Domains {
        /// Crawl output JSON.
        infile: PathBuf,
    },

    /// Run the shared attestation cache service.
    Serve {
        /// Listen address (host:port).
        #[arg(long, default_value = DEFAULT_SERVICE_ADDR)]
        addr: String,

        /// SQLite file backing the service.
        #[arg(long, default_value = DEFAULT_SERVICE_DB)]
        cache_db: PathBuf,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   topics-attest completions bash > ~/.local/share/bash-completion/completions/topics-attest
    ///   topics-attest completions zsh > ~/.zfunc/_topics-attest
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        tracing::error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let timeout = Duration::from_secs(cli.timeout);

    match cli.command {
        Commands::Analyze {
            infile,
            outfile,
            pretty,
            cache_url,
            cache_db,
            no_cache,
            allow_list,
            check_scripts,
            case_insensitive_scripts,
            log_file,
        } => {
            let log = match &log_file {
                Some(path) => OperationLog::with_file(path)?,
                None => OperationLog::new(),
            };
            let settings = Settings {
                timeout,
                cache: CacheTier::resolve(no_cache, cache_url.as_deref(), cache_db.as_deref()),
                allow_list: resolve_allow_list_path(allow_list.as_deref()),
                script_check: ScriptCheck {
                    enabled: check_scripts,
                    case_insensitive: case_insensitive_scripts,
                },
            };
            run_analyze(&infile, &outfile, pretty, &settings, log).await?;
        }

        Commands::Attest { domain } => {
            let resolver = AttestationResolver::new(
                Arc::new(HttpFetcher::new(timeout)),
                Arc::new(NoCache),
            );
            let domain = Domain::new(&domain);
            match resolver.attest(&domain).await {
                Some(record) => {
                    let json = serde_json::to_string(&record)?;
                    println!("{}", csv_line(&domain, &json));
                }
                None => tracing::info!("{domain} is not attested"),
            }
        }

        Commands::Domains { infile } => {
            let crawl = CrawlOutput::load(&infile)
                .with_context(|| format!("failed to read crawl output {}", infile.display()))?;
            let domains = extract_domains(&crawl);
            for domain in &domains {
                println!("{domain}");
            }
            tracing::info!("{} domains in {}", domains.len(), infile.display());
        }

        Commands::Serve { addr, cache_db } => {
            let store = SqliteCache::open(&cache_db)
                .with_context(|| format!("failed to open cache {}", cache_db.display()))?;
            tracing::info!("cache service storage: {}", cache_db.display());
            CacheService::new(store).run(&addr).await?;
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "topics-attest", &mut std::io::stdout());
        }
    }

    Ok(())
}

async fn run_analyze(
    infile: &Path,
    outfile: &Path,
    pretty: bool,
    settings: &Settings,
    mut log: OperationLog,
) -> anyhow::Result<()> {
    log.log(format!("Reading crawl output {}", infile.display()));
    let crawl = match CrawlOutput::load(infile) {
        Ok(crawl) => crawl,
        Err(e) => {
            // Still leave the log behind for whoever collects the outputs.
            log.log(format!("Failed to read crawl output: {e}"));
            let output = AnalysisOutput {
                log_entries: log.into_entries(),
                ..Default::default()
            };
            output.write(outfile, pretty)?;
            return Err(e).with_context(|| format!("failed to read crawl output {}", infile.display()));
        }
    };

    let correlator = settings.build_correlator(&mut log).await;
    let output = analyze(&crawl, &correlator, log).await;

    output.write(outfile, pretty)?;
    tracing::info!("analysis written to {}", outfile.display());
    Ok(())
}
