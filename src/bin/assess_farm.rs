//! Assess one farm context from the command line
//!
//! Usage:
//!   assess_farm context.json [--cohorts cohorts.csv] [--config advisor.json]
//!               [--templates catalog.json] [--literacy basic] [--locale hi] [--json]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use farm_risk_interpreter::cohort::{load_csv, load_parquet, CohortBuilder, CohortRegistry};
use farm_risk_interpreter::explanation::TemplateCatalog;
use farm_risk_interpreter::{
    AdvisorConfig, AudienceProfile, FarmContext, JsonFormatter, LiteracyLevel, MarkdownFormatter, RiskInterpreter,
    RiskQuery, SeasonWindow,
};

/// Farm risk assessment
#[derive(Parser, Debug)]
#[clap(name = "assess_farm")]
#[clap(about = "Assess context-specific farm risk and explain it")]
struct Args {
    /// Farm context JSON file
    #[clap(value_name = "CONTEXT")]
    context: PathBuf,

    /// Peer outcome records (CSV or Parquet) to build cohorts from
    #[clap(long, value_name = "FILE", env = "FARM_RISK_COHORTS")]
    cohorts: Option<PathBuf>,

    /// Advisor configuration JSON
    #[clap(long, value_name = "FILE", env = "FARM_RISK_CONFIG")]
    config: Option<PathBuf>,

    /// Template catalog JSON
    #[clap(long, value_name = "FILE")]
    templates: Option<PathBuf>,

    /// basic, standard or technical
    #[clap(long, default_value = "standard")]
    literacy: String,

    #[clap(long, default_value = "en")]
    locale: String,

    /// Crop to assess (defaults to the most recent crop)
    #[clap(long)]
    crop: Option<String>,

    /// Days until planned sowing
    #[clap(long, default_value = "14")]
    sowing_in_days: u32,

    /// Print the report as JSON instead of markdown
    #[clap(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "farm_risk_interpreter=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let total = Instant::now();

    let config = match &args.config {
        Some(path) => AdvisorConfig::load(path)?,
        None => AdvisorConfig::default(),
    };

    let Some(literacy) = LiteracyLevel::parse(&args.literacy) else {
        bail!("unknown literacy level {:?} (expected basic, standard or technical)", args.literacy);
    };

    let raw = fs::read_to_string(&args.context)
        .with_context(|| format!("Failed to read farm context: {:?}", args.context))?;
    let context = FarmContext::from_json(&raw)?;

    let registry = Arc::new(CohortRegistry::new(CohortBuilder::from_config(&config.cohort)));
    if let Some(path) = &args.cohorts {
        let path_str = path.to_string_lossy();
        let records = if path_str.ends_with(".parquet") { load_parquet(&path_str)? } else { load_csv(&path_str)? };
        let version = registry.rebuild(&records);
        tracing::info!("Built cohort snapshot v{} from {} records", version, records.len());
    }

    let mut interpreter = RiskInterpreter::new(config)?.with_cohorts(registry);
    if let Some(path) = &args.templates {
        interpreter = interpreter.with_catalog(Arc::new(TemplateCatalog::load(path)?));
    }

    let query = RiskQuery {
        crop: args.crop.clone(),
        season: SeasonWindow { sowing_in_days: args.sowing_in_days, ..SeasonWindow::default() },
        audience: AudienceProfile { literacy, locale: args.locale.clone() },
        timeout_ms: None,
    };

    let report = interpreter.analyze_risk(&context, &query)?;

    if args.json {
        println!("{}", JsonFormatter::format(&report)?);
    } else {
        println!("{}", MarkdownFormatter::format(&report));
    }

    tracing::info!("Done in {:.1} ms", total.elapsed().as_secs_f64() * 1000.0);
    Ok(())
}
