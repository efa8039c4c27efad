use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use cellbridge_parse::{AccessPattern, SourceDialect, SourceRewriter};
use cellbridge_runtime::{
    BridgeConfig, CapabilityDetector, EngineWorker, HostValue, MemoryGrid, QueryOutput,
    RunnerContext, Scalar, runtime_supports_shared_memory,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cellbridge", about = "Query cells through the runner bridge")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a grid, start an engine and query one range.
    Query(QueryArgs),
    /// Print a source file with data-access calls awaited.
    Rewrite(RewriteArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Decide from the build and the configured flags.
    Auto,
    /// Force the shared-memory handshake.
    Sync,
    /// Force the message bridge.
    Async,
}

#[derive(Parser, Debug)]
struct QueryArgs {
    /// Grid document (JSON).
    #[arg(long)]
    grid: PathBuf,

    /// A1 range, e.g. `Sheet1!A1:B5`.
    #[arg(long)]
    range: String,

    #[arg(long, value_enum, default_value_t = Mode::Auto)]
    mode: Mode,

    /// Bridge configuration (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct RewriteArgs {
    #[arg(long)]
    file: PathBuf,

    /// `js` or `python`.
    #[arg(long, default_value_t = SourceDialect::JavaScript)]
    dialect: SourceDialect,

    /// Dotted path of the call to await.
    #[arg(long = "function", default_value = "q.cells")]
    function: AccessPattern,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Query(args) => run_query(args),
        Command::Rewrite(args) => run_rewrite(args),
    }
}

fn run_query(args: QueryArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => BridgeConfig::from_path(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => BridgeConfig::interactive(),
    };
    let detector = match args.mode {
        Mode::Auto => CapabilityDetector::with_flags(runtime_supports_shared_memory(), config.flags),
        Mode::Sync => CapabilityDetector::with_flags(true, Default::default()),
        Mode::Async => CapabilityDetector::new(false),
    };

    let grid = MemoryGrid::from_path(&args.grid)
        .with_context(|| format!("loading grid {}", args.grid.display()))?;
    let engine = EngineWorker::spawn(grid).context("starting engine worker")?;
    let (handle, responses) = engine.connect()?;
    let runner = RunnerContext::start(config, &detector, handle, responses)?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("building runtime")?;
    let output = rt
        .block_on(runner.query_cells(&args.range))
        .with_context(|| format!("querying {}", args.range))?;

    let transport = if runner.is_sync() { "sync" } else { "async" };
    let report = json!({
        "range": args.range,
        "transport": transport,
        "shape": output.shape_name(),
        "value": output_json(&output),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_rewrite(args: RewriteArgs) -> Result<()> {
    let source = fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let rewriter = SourceRewriter::new(args.function, args.dialect);
    let rewritten = rewriter
        .try_rewrite(&source)
        .with_context(|| format!("lexing {}", args.file.display()))?;
    print!("{rewritten}");
    Ok(())
}

fn output_json(output: &QueryOutput) -> Value {
    match output {
        QueryOutput::Scalar(cell) => scalar_json(cell),
        QueryOutput::Vector(cells) => Value::Array(cells.iter().map(scalar_json).collect()),
        QueryOutput::Matrix(rows) => Value::Array(
            rows.iter()
                .map(|row| Value::Array(row.iter().map(scalar_json).collect()))
                .collect(),
        ),
    }
}

fn scalar_json(cell: &Scalar) -> Value {
    match cell {
        None => Value::Null,
        Some(HostValue::Text(s)) => Value::String(s.clone()),
        Some(HostValue::Number(n)) => json!(n),
        Some(HostValue::Logical(b)) => Value::Bool(*b),
        Some(HostValue::Duration(d)) => json!({ "duration_ms": d.num_milliseconds() }),
        Some(other) => json!({ other.type_name(): other.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_both_commands() {
        let cli = Cli::try_parse_from([
            "cellbridge", "query", "--grid", "g.json", "--range", "A1:B2", "--mode", "async",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Query(QueryArgs { mode: Mode::Async, .. })));

        let cli = Cli::try_parse_from([
            "cellbridge", "rewrite", "--file", "a.py", "--dialect", "python", "--function", "sheet.cells",
        ])
        .unwrap();
        match cli.command {
            Command::Rewrite(args) => {
                assert_eq!(args.dialect, SourceDialect::Python);
                assert_eq!(args.function.to_string(), "sheet.cells");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn values_render_as_json() {
        let out = QueryOutput::Matrix(vec![vec![
            None,
            Some(HostValue::Number(2.5)),
            Some(HostValue::Logical(false)),
            Some(HostValue::Html("<b>x</b>".into())),
        ]]);
        assert_eq!(
            output_json(&out),
            json!([[null, 2.5, false, {"html": "<b>x</b>"}]])
        );
    }
}
