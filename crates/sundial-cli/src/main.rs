//! sundial command line: validate and evaluate temporal rule sets.
//!
//! `check` converts every descriptor in a JSON array and reports shape
//! errors with their 1-based condition index. `eval` evaluates the rule set
//! at a given instant and prints per-condition results plus the first match.
//!
//! The binary runs without an ephemeris backend or expression engine:
//! conditions that need either report an error instead of matching.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use serde_json::Value;

use sundial_core::{
    Almanac, Condition, ContextStore, CustomDay, CustomEventRegistry, EvalConfig, EventCatalog,
    Evaluator, MoonDay, NoExpressions, Resolver, RuleSet, StoreKind, ThreadRngSource,
};

#[derive(Parser)]
#[command(name = "sundial", version, about = "Validate and evaluate temporal rule sets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a JSON array of condition descriptors for shape errors.
    Check {
        /// Input file, or `-` for stdin.
        input: String,
    },
    /// Evaluate a rule set at an instant.
    Eval {
        /// Input file, or `-` for stdin.
        input: String,
        /// Base instant as RFC 3339. Defaults to now.
        #[arg(long)]
        at: Option<String>,
        /// IANA timezone for evaluation.
        #[arg(long, default_value = "UTC")]
        timezone: String,
        #[arg(long, default_value_t = 0.0)]
        latitude: f64,
        #[arg(long, default_value_t = 0.0)]
        longitude: f64,
    },
}

/// Almanac stub: every event name is unknown.
struct EmptyAlmanac;

impl Almanac for EmptyAlmanac {
    fn sun_events(
        &self,
        _day: NaiveDate,
        _latitude: f64,
        _longitude: f64,
    ) -> BTreeMap<String, Option<DateTime<Utc>>> {
        BTreeMap::new()
    }

    fn moon_events(&self, _day: NaiveDate, _latitude: f64, _longitude: f64) -> MoonDay {
        MoonDay::default()
    }

    fn custom_events(
        &self,
        _day: NaiveDate,
        _latitude: f64,
        _longitude: f64,
        _angle: f64,
    ) -> CustomDay {
        CustomDay::default()
    }
}

/// Context store backed by process environment variables. Only the `env`
/// store is populated.
struct EnvStore;

impl ContextStore for EnvStore {
    fn get(&self, store: StoreKind, key: &str) -> Option<Value> {
        match store {
            StoreKind::Env => std::env::var(key).ok().map(Value::String),
            _ => None,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Check { input } => check(&input),
        Command::Eval {
            input,
            at,
            timezone,
            latitude,
            longitude,
        } => eval(&input, at, &timezone, latitude, longitude).await,
    }
}

fn load_rules(input: &str) -> anyhow::Result<Vec<Value>> {
    let text = if input == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("cannot read stdin")?;
        buffer
    } else {
        std::fs::read_to_string(input).with_context(|| format!("cannot read {input}"))?
    };
    let parsed: Value = serde_json::from_str(&text).context("input is not valid JSON")?;
    match parsed {
        Value::Array(items) => Ok(items),
        _ => bail!("input is not a JSON array of conditions"),
    }
}

fn check(input: &str) -> anyhow::Result<()> {
    let raw = load_rules(input)?;
    let catalog = EventCatalog::default();
    let mut failures = 0usize;
    for (i, value) in raw.iter().enumerate() {
        if let Err(error) = sundial_core::convert(value, i + 1, &catalog) {
            println!("{error}");
            failures += 1;
        }
    }
    if failures > 0 {
        bail!("{failures} invalid condition(s)");
    }
    println!("ok: {} conditions", raw.len());
    Ok(())
}

async fn eval(
    input: &str,
    at: Option<String>,
    timezone: &str,
    latitude: f64,
    longitude: f64,
) -> anyhow::Result<()> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| anyhow!("unknown timezone '{timezone}'"))?;
    let base = match at {
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .with_context(|| format!("cannot parse '{text}' as RFC 3339"))?
            .with_timezone(&tz),
        None => Utc::now().with_timezone(&tz),
    };

    let raw = load_rules(input)?;
    let catalog = Arc::new(EventCatalog::default());
    let rules = RuleSet::from_raw(&raw, &catalog)?;

    let resolver = Resolver::new(
        EvalConfig {
            timezone: tz,
            latitude,
            longitude,
        },
        Arc::new(EmptyAlmanac),
        Arc::new(CustomEventRegistry::new()),
        Arc::new(EnvStore),
        Arc::new(ThreadRngSource),
    );
    let evaluator = Evaluator::new(resolver, catalog, Arc::new(NoExpressions));

    let mut first = None;
    let mut any = false;
    for (i, condition) in rules.conditions().iter().enumerate() {
        let outcome = match condition {
            Condition::Otherwise => Ok(!any),
            _ => evaluator.evaluate(base, condition, i + 1).await,
        };
        let matched = match outcome {
            Ok(matched) => {
                println!("{}: {}", i + 1, if matched { "match" } else { "no match" });
                matched
            }
            Err(error) => {
                println!("{}: error: {error}", i + 1);
                false
            }
        };
        if matched {
            any = true;
            if first.is_none() {
                first = Some(i + 1);
            }
        }
    }
    match first {
        Some(index) => println!("first match: {index}"),
        None => println!("first match: none"),
    }
    Ok(())
}
