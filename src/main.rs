use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, error, info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use declscope::analysis::{
    CommandExtractor, ExtractorCommand, GroupBy, LogProgress, ModuleResolver, ModuleStrategy,
    ProgressReporter, ScanConfig, ScanOutcome, ScanSession, TerminalProgress, TreeWalker,
    VisibilityFilter,
};
use declscope::export::{ReportBuilder, ReportData, ReportOptions, DEFAULT_KIND_PREFIX};
use declscope::parser::{discover_modules, ModuleCatalog};

#[derive(Parser)]
#[command(name = "declscope")]
#[command(author = "Zachary Woods <143150513+zach-fau@users.noreply.github.com>")]
#[command(version)]
#[command(about = "Declaration inventory for module-organized source trees", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a source tree and report its visible declarations
    Scan(ScanArgs),
    /// Show version information
    Version,
}

#[derive(clap::Args)]
struct ScanArgs {
    /// Root of the tree to scan (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    path: PathBuf,

    /// Extension of source files to extract
    #[arg(short, long, default_value = "swift")]
    extension: String,

    /// Visibility preset: public or public+internal
    #[arg(long, default_value = "public")]
    visibility: VisibilityFilter,

    /// Accessibility level or tag to accept (repeatable, overrides --visibility)
    #[arg(long = "accept", value_name = "TAG")]
    accept: Vec<String>,

    /// Accumulator grouping: kind, module or flat
    #[arg(short, long, default_value = "kind")]
    group_by: GroupBy,

    /// Column the table is grouped by
    #[arg(long, default_value = "module")]
    table_group: String,

    /// Render the table as a single block
    #[arg(long, conflicts_with = "table_group")]
    no_table_group: bool,

    /// How module names are derived: manifest or path
    #[arg(long, default_value = "manifest")]
    module_strategy: ModuleStrategy,

    /// Path prefix holding third-party sources (repeatable, replaces the defaults)
    #[arg(long = "third-party-prefix", value_name = "PREFIX")]
    third_party_prefixes: Vec<String>,

    /// Only scan module directories found through the manifests
    #[arg(long)]
    modules_only: bool,

    /// Extractor command line, split on whitespace (no quoting); `{file}` is
    /// replaced by the source path. Pass arguments containing spaces after `--`.
    #[arg(long, default_value = "sourcekitten structure --file {file}")]
    command: String,

    /// Extractor argv given verbatim, e.g. `-- sh -c 'cat "$0"' {file}`.
    /// Takes precedence over --command.
    #[arg(last = true, value_name = "ARGV")]
    argv: Vec<String>,

    /// Prefix stripped from kinds in the report
    #[arg(long, default_value = DEFAULT_KIND_PREFIX)]
    kind_prefix: String,

    /// Directory the report artifacts are written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Log progress instead of redrawing it on stderr
    #[arg(long)]
    no_progress: bool,

    /// Fail a file when the extractor writes anything to stderr
    #[arg(long)]
    strict_stderr: bool,

    /// Ceiling on extractor output per file, in bytes
    #[arg(long, default_value_t = declscope::analysis::extractor::DEFAULT_MAX_OUTPUT_BYTES)]
    max_output_bytes: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Scan(args)) => {
            // The live block and log lines share stderr, so logs go through it.
            if args.no_progress || !std::io::stderr().is_terminal() {
                setup_logging(&cli.log_level, BoxMakeWriter::new(std::io::stderr));
                scan(args, LogProgress)
            } else {
                let progress = TerminalProgress::stderr();
                setup_logging(&cli.log_level, BoxMakeWriter::new(progress.log_writer()));
                scan(args, progress)
            }
        }
        Some(Commands::Version) => {
            setup_logging(&cli.log_level, BoxMakeWriter::new(std::io::stderr));
            println!("declscope v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            println!("declscope - Declaration Inventory");
            println!("Run 'declscope scan' to scan the current directory");
            println!("Run 'declscope --help' for more information");
            Ok(())
        }
    }
}

fn setup_logging(log_level: &str, writer: BoxMakeWriter) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .without_time()
        .init();
}

fn scan<P: ProgressReporter>(args: ScanArgs, progress: P) -> Result<()> {
    let root = args.path.as_path();
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }

    let catalog = discover_modules(root);
    info!(
        "All module names: {}",
        catalog.iter().collect::<Vec<_>>().join(", ")
    );

    let filter = if args.accept.is_empty() {
        args.visibility.clone()
    } else {
        VisibilityFilter::new(args.accept.iter().cloned())
    };
    let mut resolver = ModuleResolver::new(catalog.clone()).with_strategy(args.module_strategy);
    if !args.third_party_prefixes.is_empty() {
        resolver = resolver.with_third_party_prefixes(args.third_party_prefixes.iter().cloned());
    }
    let command = if args.argv.is_empty() {
        ExtractorCommand::parse(&args.command)
    } else {
        ExtractorCommand::new(args.argv.iter().cloned())
    };
    let extractor = CommandExtractor::new(command, filter, resolver)
        .with_max_output_bytes(args.max_output_bytes)
        .with_strict_stderr(args.strict_stderr);
    debug!(
        accepted = %extractor.filter().accepted().collect::<Vec<_>>().join(","),
        strategy = %extractor.resolver().strategy(),
        known_modules = extractor.resolver().catalog().len(),
        "Extractor configured"
    );

    let config = ScanConfig {
        extension: args.extension.trim_start_matches('.').to_string(),
        group_by: args.group_by,
        ..ScanConfig::default()
    };

    let outcome = run_scan(root, &catalog, args.modules_only, config, extractor, progress);

    if outcome.is_clean() {
        info!("{}", outcome.summary());
    } else {
        warn!("{}", outcome.summary());
        for failure in &outcome.failures {
            warn!("  skipped {}: {}", failure.path, failure.message);
        }
    }

    let builder = ReportBuilder::new(ReportOptions {
        kind_prefix: args.kind_prefix,
        table_group: (!args.no_table_group).then_some(args.table_group),
        output_dir: args.output_dir,
    });
    report(&builder, &outcome)
}

fn run_scan<P: ProgressReporter>(
    root: &Path,
    catalog: &ModuleCatalog,
    modules_only: bool,
    config: ScanConfig,
    extractor: CommandExtractor,
    progress: P,
) -> ScanOutcome {
    let mut session = ScanSession::new(config.group_by);
    let mut walker = TreeWalker::new(config, extractor, progress);
    if modules_only {
        walker.scan_module_directories(root, catalog, &mut session);
    } else {
        walker.scan(root, &mut session);
    }
    session.finish()
}

fn report(builder: &ReportBuilder, outcome: &ScanOutcome) -> Result<()> {
    let rows = builder.rows(&outcome.accumulator);
    let data = ReportData::new(&outcome.accumulator, &rows);

    let table = match builder.render(&rows) {
        Ok(table) => table,
        Err(e) => {
            let persisted = builder.persist(&data);
            error!("Report table could not be rendered: {}", e);
            return Err(e).with_context(|| {
                format!(
                    "reporting failed after writing {} artifact(s)",
                    persisted.written.len()
                )
            });
        }
    };

    let persisted = builder.persist(&data.with_table(&table));
    println!("Report Table:\n");
    println!("{}", table);

    if persisted.written.is_empty() {
        bail!(
            "no report artifacts could be written to {}",
            builder.options().output_dir.display()
        );
    }
    Ok(())
}
