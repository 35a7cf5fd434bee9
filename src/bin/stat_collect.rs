use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use stat_collector::catalog::{JsonCatalog, ResourceCatalog};
use stat_collector::collector::{CollectOptions, CollectReport, Collector, ProgressSink};
use stat_collector::config::{ConfigLoader, ResolvedConfig, SourceProfile};
use stat_collector::domain::{DatasetId, MetadataType, SourceKind};
use stat_collector::error::CollectError;
use stat_collector::output::{
    ConsoleSink, JsonOutput, OutputMode, print_catalog_table, print_summary, write_index_csv,
};
use stat_collector::sdmx::SdmxClient;
use stat_collector::source::MetadataClient;
use stat_collector::store::Store;
use stat_collector::transport::ReqwestTransport;
use stat_collector::unido::UnidoClient;

const EXIT_DATASET_FAILED: u8 = 4;

#[derive(Parser)]
#[command(name = "stat-collect")]
#[command(about = "Version-gated collection of Eurostat, Prodcom and UNIDO datasets")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Collect every configured dataset whose remote version changed")]
    Collect(CollectArgs),
    #[command(about = "Dump the metadata index of an SDMX source")]
    Index(IndexArgs),
    #[command(about = "Print the remote version stamp of a dataset")]
    Version(VersionArgs),
    #[command(about = "List committed resources")]
    Catalog(CatalogArgs),
}

#[derive(Args)]
struct CollectArgs {
    #[arg(long = "source")]
    sources: Vec<SourceKind>,

    #[arg(long = "dataset")]
    datasets: Vec<String>,

    #[arg(long)]
    data_root: Option<Utf8PathBuf>,

    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct IndexArgs {
    #[arg(long)]
    source: SourceKind,

    metadata_type: MetadataType,

    #[arg(long)]
    out: Option<Utf8PathBuf>,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct VersionArgs {
    #[arg(long)]
    source: SourceKind,

    dataset: String,
}

#[derive(Args)]
struct CatalogArgs {
    #[arg(long)]
    data_root: Option<Utf8PathBuf>,

    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<CollectError>() {
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &CollectError) -> u8 {
    match error {
        CollectError::MissingConfig
        | CollectError::ConfigRead(_)
        | CollectError::ConfigParse(_)
        | CollectError::UnknownSource(_)
        | CollectError::UnknownMetadataType(_)
        | CollectError::InvalidDatasetId(_) => 2,
        CollectError::MetadataUnavailable { .. } => 3,
        error if error.is_transport() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Collect(args) => run_collect(args, &config),
        Commands::Index(args) => run_index(args, &config),
        Commands::Version(args) => run_version(args, &config),
        Commands::Catalog(args) => run_catalog(args, &config),
    }
}

fn run_collect(args: CollectArgs, config: &ResolvedConfig) -> miette::Result<ExitCode> {
    let store = open_store(args.data_root, config)?;
    let catalog = JsonCatalog::open(store.catalog_path());
    let options = CollectOptions {
        dry_run: args.dry_run,
        force: args.force,
    };
    let mode = if args.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let sink: &dyn ProgressSink = match mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &ConsoleSink,
    };

    let datasets = args
        .datasets
        .iter()
        .map(|value| value.parse::<DatasetId>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut report = CollectReport::default();
    for profile in &config.sources {
        if !args.sources.is_empty() && !args.sources.contains(&profile.kind) {
            continue;
        }
        let mut profile = profile.clone();
        if !datasets.is_empty() {
            profile.datasets.retain(|dataset| datasets.contains(dataset));
            if profile.datasets.is_empty() {
                continue;
            }
        }
        match collect_source(&profile, &store, &catalog, options, sink) {
            Ok(source_report) => report.extend(source_report),
            Err(err) => report.extend(CollectReport::source_failed(&profile, &err)),
        }
    }

    match mode {
        OutputMode::Json => JsonOutput::print_report(&report).into_diagnostic()?,
        OutputMode::Human => print_summary(&report),
    }

    if report.failed() > 0 {
        return Ok(ExitCode::from(EXIT_DATASET_FAILED));
    }
    Ok(ExitCode::SUCCESS)
}

fn collect_source(
    profile: &SourceProfile,
    store: &Store,
    catalog: &JsonCatalog,
    options: CollectOptions,
    sink: &dyn ProgressSink,
) -> Result<CollectReport, CollectError> {
    let transport = ReqwestTransport::new()?;
    if profile.kind.is_sdmx() {
        let client = SdmxClient::from_profile(transport, profile);
        Collector::new(store.clone(), &client, &client, catalog).collect(profile, options, sink)
    } else {
        let client = UnidoClient::from_profile(transport, profile);
        Collector::new(store.clone(), &client, &client, catalog).collect(profile, options, sink)
    }
}

fn run_index(args: IndexArgs, config: &ResolvedConfig) -> miette::Result<ExitCode> {
    let profile = source_profile(config, args.source)?;
    if !profile.kind.is_sdmx() {
        return Err(CollectError::UnknownSource(format!(
            "{} does not publish an SDMX metadata index",
            profile.kind
        ))
        .into());
    }
    let client = SdmxClient::from_profile(ReqwestTransport::new()?, profile);
    let index = client.fetch_dataset_index(args.metadata_type)?;
    if args.json {
        JsonOutput::print_index(&index).into_diagnostic()?;
    } else {
        write_index_csv(&index, args.out.as_deref())?;
    }
    Ok(ExitCode::SUCCESS)
}

fn run_version(args: VersionArgs, config: &ResolvedConfig) -> miette::Result<ExitCode> {
    let profile = source_profile(config, args.source)?;
    let dataset: DatasetId = args.dataset.parse()?;
    let transport = ReqwestTransport::new()?;
    let client: Box<dyn MetadataClient> = if profile.kind.is_sdmx() {
        Box::new(SdmxClient::from_profile(transport, profile))
    } else {
        Box::new(UnidoClient::from_profile(transport, profile))
    };
    let version = client.fetch_version(&dataset)?;
    println!("{version}");
    Ok(ExitCode::SUCCESS)
}

fn run_catalog(args: CatalogArgs, config: &ResolvedConfig) -> miette::Result<ExitCode> {
    let store = open_store(args.data_root, config)?;
    let resources = JsonCatalog::open(store.catalog_path()).list()?;
    if args.json {
        JsonOutput::print_catalog(&resources).into_diagnostic()?;
    } else {
        print_catalog_table(&resources);
    }
    Ok(ExitCode::SUCCESS)
}

fn open_store(
    data_root: Option<Utf8PathBuf>,
    config: &ResolvedConfig,
) -> Result<Store, CollectError> {
    match data_root.or_else(|| config.data_root.clone()) {
        Some(root) => Ok(Store::new_with_root(root)),
        None => Store::new(),
    }
}

fn source_profile(
    config: &ResolvedConfig,
    kind: SourceKind,
) -> Result<&SourceProfile, CollectError> {
    config
        .source(kind)
        .ok_or_else(|| CollectError::UnknownSource(format!("{kind} is not configured")))
}
