use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use cardinality_common::{
    reduce, CardinalityCollector, CardinalityConfig, CardinalityResult, CounterKind, ReduceMode,
    ValueFormatter,
};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[clap(about, version, author)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Collect one value per line into a shard result file.
    Shard(ShardArgs),
    /// Reduce shard result files into one rendered result.
    Reduce(ReduceArgs),
    /// Print the content of a shard result file.
    Inspect(InspectArgs),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Args)]
struct ShardArgs {
    /// Aggregation name.
    #[clap(long)]
    pub name: String,
    #[clap(long)]
    pub input: PathBuf,
    #[clap(long)]
    pub output: PathBuf,
    /// JSON encoded CardinalityConfig, overridden by --kind and --precision.
    #[clap(long)]
    pub config: Option<PathBuf>,
    #[clap(long)]
    pub kind: Option<CounterKind>,
    #[clap(long)]
    pub precision: Option<u8>,
    /// Lines are `ordinal<TAB>value` instead of a bare value.
    #[clap(long)]
    pub bucket_field: bool,
    /// The bucket ordinal written to the output.
    #[clap(long, default_value_t = 0)]
    pub bucket: usize,
    /// raw, ipv4, number[:SEPARATOR] or date:PATTERN.
    #[clap(long)]
    pub format: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Args)]
struct ReduceArgs {
    #[clap(required = true)]
    pub files: Vec<PathBuf>,
    /// Reduce pairwise instead of folding in file order.
    #[clap(long)]
    pub tree: bool,
    #[clap(long)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Args)]
struct InspectArgs {
    pub file: PathBuf,
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    debug!("command: {:?}", cli.command);
    match cli.command {
        Command::Shard(args) => shard(args),
        Command::Reduce(args) => reduce_files(args),
        Command::Inspect(args) => inspect(args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CardinalityConfig> {
    let config = match path {
        Some(path) => {
            let data = fs::read(path).with_context(|| format!("read config {:?}", path))?;
            serde_json::from_slice(&data).with_context(|| format!("parse config {:?}", path))?
        }
        None => CardinalityConfig::default(),
    };
    Ok(config)
}

fn parse_formatter(s: &str) -> anyhow::Result<ValueFormatter> {
    let (name, arg) = match s.split_once(':') {
        Some((name, arg)) => (name, Some(arg)),
        None => (s, None),
    };

    Ok(match (name, arg) {
        ("raw", None) => ValueFormatter::Raw,
        ("ipv4", None) => ValueFormatter::Ipv4,
        ("number", None) => ValueFormatter::number(','),
        ("number", Some(sep)) => {
            let mut chars = sep.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => ValueFormatter::number(c),
                _ => bail!("number separator must be a single character, got {:?}", sep),
            }
        }
        ("date", Some(pattern)) => ValueFormatter::date_time(pattern)?,
        _ => bail!("unknown format {:?}", s),
    })
}

fn shard(args: ShardArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(kind) = args.kind {
        config.kind = kind;
    }
    if let Some(precision) = args.precision {
        config.precision = precision;
    }
    let formatter = args.format.as_deref().map(parse_formatter).transpose()?;

    let mut collector = CardinalityCollector::new(args.name.as_str(), &config, formatter)?;

    let input = File::open(&args.input).with_context(|| format!("open {:?}", args.input))?;
    let mut lines = 0_usize;
    for (i, line) in BufReader::new(input).lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let (ordinal, value) = if args.bucket_field {
            let (ordinal, value) = line
                .split_once('\t')
                .ok_or_else(|| anyhow!("line {}: expected ordinal<TAB>value", i + 1))?;
            let ordinal = ordinal
                .parse::<usize>()
                .with_context(|| format!("line {}: invalid ordinal {:?}", i + 1, ordinal))?;
            (ordinal, value)
        } else {
            (0, line.as_str())
        };
        collector.collect(ordinal, value.as_bytes())?;
        lines += 1;
    }

    let result = collector.build_result(args.bucket)?;
    fs::write(&args.output, result.to_bytes()?)
        .with_context(|| format!("write {:?}", args.output))?;

    info!(
        name = result.name(),
        kind = %config.kind,
        precision = config.precision,
        lines,
        buckets = collector.counts().capacity(),
        value = result.value(),
        "wrote shard {:?}",
        args.output
    );
    Ok(())
}

fn read_result(path: &Path) -> anyhow::Result<CardinalityResult> {
    let data = fs::read(path).with_context(|| format!("read {:?}", path))?;
    let result = CardinalityResult::from_bytes(&data).with_context(|| format!("decode {:?}", path))?;
    Ok(result)
}

fn reduce_files(args: ReduceArgs) -> anyhow::Result<()> {
    let mut ctx = load_config(args.config.as_deref())?.reduce_context();
    if args.tree {
        ctx.mode = ReduceMode::Tree;
    }

    let results = args
        .files
        .iter()
        .map(|path| read_result(path))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let name = results[0].name().to_string();
    if let Some(other) = results.iter().find(|r| r.name() != name) {
        bail!(
            "cannot reduce results of different aggregations: {:?} and {:?}",
            name,
            other.name()
        );
    }

    let reduced = reduce(results, &ctx)?;
    info!(
        name = reduced.name(),
        inputs = args.files.len(),
        mode = ?ctx.mode,
        "reduced"
    );

    let mut doc = serde_json::Map::new();
    doc.insert(name, serde_json::to_value(reduced.render())?);
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn inspect(args: InspectArgs) -> anyhow::Result<()> {
    let result = read_result(&args.file)?;

    println!("name: {}", result.name());
    match result.formatter() {
        Some(f) => println!("formatter: {:?}", f),
        None => println!("formatter: none"),
    }
    match result.counts() {
        Some(counts) => {
            println!("present: true");
            println!("kind: {}", counts.kind());
            println!("precision: {}", counts.precision());
            println!("bytes: {}", counts.bytes());
        }
        None => println!("present: false"),
    }
    println!("value: {}", result.value());
    Ok(())
}
