use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use genomic_dashboard_core::config::{ConfigLoader, ResolvedConfig};
use genomic_dashboard_core::domain::{Granularity, LapisFilter, NamedFilter, SequenceType};
use genomic_dashboard_core::error::DashboardError;
use genomic_dashboard_core::lapis::LapisHttpClient;
use genomic_dashboard_core::mutation::Mutation;
use genomic_dashboard_core::output::JsonOutput;
use genomic_dashboard_core::queries::{
    GrowthModelHttpClient, MutationsOverTimeRequest, QueryContext, query_aggregated_data,
    query_mutations, query_mutations_over_time, query_prevalence_over_time,
    query_relative_growth_advantage,
};
use genomic_dashboard_core::temporal::{TemporalCache, generate_range};

#[derive(Parser)]
#[command(name = "dashboard-query")]
#[command(about = "Run genomic-surveillance dashboard queries against a LAPIS instance")]
#[command(version, author)]
struct Cli {
    /// Path to dashboard.json
    #[arg(long, global = true)]
    config: Option<String>,

    /// Filter assignment `key=value`, repeatable
    #[arg(long = "filter", global = true, value_parser = parse_assignment)]
    filters: Vec<(String, Value)>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Sequence counts grouped by fields")]
    Aggregated(AggregatedArgs),
    #[command(about = "Substitutions, deletions and insertions above a proportion")]
    Mutations(MutationsArgs),
    #[command(about = "Mutation proportions per date unit")]
    MutationsOverTime(MutationsOverTimeArgs),
    #[command(about = "Prevalence of variants within the filtered sequences")]
    Prevalence(PrevalenceArgs),
    #[command(about = "Relative growth advantage of a variant")]
    GrowthAdvantage(GrowthAdvantageArgs),
    #[command(about = "Parse a mutation code and print its canonical form")]
    ParseMutation(ParseMutationArgs),
    #[command(about = "List every date unit between two days")]
    DateRange(DateRangeArgs),
}

#[derive(Args)]
struct AggregatedArgs {
    /// Fields to group by, comma separated
    #[arg(long, value_delimiter = ',')]
    fields: Vec<String>,
}

#[derive(Args)]
struct MutationsArgs {
    #[arg(long, value_enum, default_value_t = SequenceType::Nucleotide)]
    sequence_type: SequenceType,

    #[arg(long)]
    min_proportion: Option<f64>,
}

#[derive(Args)]
struct MutationsOverTimeArgs {
    #[arg(long, value_enum, default_value_t = SequenceType::Nucleotide)]
    sequence_type: SequenceType,

    #[arg(long, value_enum, default_value_t = Granularity::Week)]
    granularity: Granularity,

    #[arg(long)]
    min_proportion: Option<f64>,
}

#[derive(Args)]
struct PrevalenceArgs {
    /// Variant as `name:key=value,key=value`, repeatable
    #[arg(long, required = true, value_parser = parse_named_filter)]
    numerator: Vec<NamedFilter>,

    #[arg(long, value_enum, default_value_t = Granularity::Day)]
    granularity: Granularity,

    #[arg(long, default_value_t = 1)]
    smoothing_window: usize,
}

#[derive(Args)]
struct GrowthAdvantageArgs {
    /// Variant filter as `key=value,key=value`
    #[arg(long)]
    numerator: LapisFilter,

    #[arg(long, default_value_t = 7.0)]
    generation_time: f64,
}

#[derive(Args)]
struct ParseMutationArgs {
    code: String,
}

#[derive(Args)]
struct DateRangeArgs {
    from: String,
    to: String,

    #[arg(long, value_enum, default_value_t = Granularity::Day)]
    granularity: Granularity,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<DashboardError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &DashboardError) -> u8 {
    match error {
        DashboardError::MissingConfig
        | DashboardError::ConfigRead(_)
        | DashboardError::ConfigParse(_)
        | DashboardError::InvalidConfig(_)
        | DashboardError::UserFacing { .. }
        | DashboardError::InvalidFilter(_)
        | DashboardError::InvalidMutationCode(_)
        | DashboardError::InvalidTemporal(_)
        | DashboardError::InvalidWindowSize(_)
        | DashboardError::GranularityMismatch { .. } => 2,
        DashboardError::LapisHttp(_)
        | DashboardError::LapisStatus { .. }
        | DashboardError::GrowthModelHttp(_)
        | DashboardError::GrowthModelStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut filter = LapisFilter::new();
    for (key, value) in cli.filters {
        filter.insert(key, value);
    }

    match cli.command {
        Commands::ParseMutation(args) => {
            let mutation: Mutation = args.code.parse()?;
            JsonOutput::print_json(&serde_json::json!({
                "code": mutation.code(),
                "mutation": mutation,
            }))
            .into_diagnostic()
        }
        Commands::DateRange(args) => {
            let cache = TemporalCache::new();
            let from = cache.from_date_string(&args.from, args.granularity)?;
            let to = cache.from_date_string(&args.to, args.granularity)?;
            let range = generate_range(&cache, &from, &to)?;
            JsonOutput::print_json(&range).into_diagnostic()
        }
        command => {
            let config = ConfigLoader::resolve_or_default(cli.config.as_deref())?;
            run_query(command, &config, &filter)
        }
    }
}

fn run_query(
    command: Commands,
    config: &ResolvedConfig,
    filter: &LapisFilter,
) -> miette::Result<()> {
    let lapis = LapisHttpClient::new(&config.lapis_url, config.timeout)?;
    let cache = TemporalCache::new();
    let ctx = QueryContext::new(&lapis, &cache);

    match command {
        Commands::Aggregated(args) => {
            let entries = query_aggregated_data(&ctx, filter, &args.fields)?;
            JsonOutput::print_json(&entries).into_diagnostic()
        }
        Commands::Mutations(args) => {
            let min_proportion = args.min_proportion.unwrap_or(config.min_proportion);
            let entries = query_mutations(&ctx, filter, args.sequence_type, min_proportion)?;
            JsonOutput::print_json(&entries).into_diagnostic()
        }
        Commands::MutationsOverTime(args) => {
            let request = MutationsOverTimeRequest {
                filter: filter.clone(),
                sequence_type: args.sequence_type,
                granularity: args.granularity,
                date_field: config.date_field.clone(),
                min_proportion: args.min_proportion.unwrap_or(config.min_proportion),
                max_columns: config.max_grid_columns,
            };
            let data = query_mutations_over_time(&ctx, &request)?;
            JsonOutput::print_json(&data.contents()).into_diagnostic()
        }
        Commands::Prevalence(args) => {
            let numerators = args
                .numerator
                .iter()
                .map(|named| {
                    NamedFilter::new(named.display_name.clone(), filter.merged(&named.lapis_filter))
                })
                .collect::<Vec<_>>();
            let series = query_prevalence_over_time(
                &ctx,
                &numerators,
                filter,
                args.granularity,
                args.smoothing_window,
                &config.date_field,
            )?;
            JsonOutput::print_json(&series).into_diagnostic()
        }
        Commands::GrowthAdvantage(args) => {
            let model = GrowthModelHttpClient::new(&config.growth_model_url, config.timeout)?;
            let result = query_relative_growth_advantage(
                &ctx,
                &filter.merged(&args.numerator),
                filter,
                args.generation_time,
                &config.date_field,
                &model,
            )?;
            JsonOutput::print_json(&result).into_diagnostic()
        }
        Commands::ParseMutation(_) | Commands::DateRange(_) => Err(miette::Report::msg(
            "command does not need a backend",
        )),
    }
}

fn parse_assignment(input: &str) -> Result<(String, Value), String> {
    LapisFilter::parse_assignment(input).map_err(|err| err.to_string())
}

fn parse_named_filter(input: &str) -> Result<NamedFilter, String> {
    let (name, pairs) = match input.split_once(':') {
        Some((name, pairs)) => (name.trim(), pairs),
        None => (input.trim(), input),
    };
    let filter = pairs.parse::<LapisFilter>().map_err(|err| err.to_string())?;
    Ok(NamedFilter::new(name, filter))
}
