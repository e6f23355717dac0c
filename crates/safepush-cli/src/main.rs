use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use safepush_client::{AnthropicOracle, CogCli, CogLinter, HttpFetcher, ReplicateClient};
use safepush_core::{FuzzConfig, Inputs};
use safepush_runner::{render_summary, write_report, Campaign, Config, Ports, TestCaseConfig, DEFAULT_CONFIG_FILE};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod args;

const FETCH_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Parser)]
#[command(name = "safe-push", version, about = "Validate a new model version before pushing it")]
struct Cli {
    /// Model to push, `owner/name`. Overrides the config file.
    model: Option<String>,

    /// Config file (YAML, or TOML by extension). Defaults to ./safe-push.yaml when present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model the candidate is pushed to first. Defaults to `<model>-test`.
    #[arg(long)]
    test_model: Option<String>,

    /// Hardware for the test model when it has to be created.
    #[arg(long)]
    test_hardware: Option<String>,

    /// Validate only; never push to the real model.
    #[arg(long)]
    no_push: bool,

    /// Per-prediction timeout in seconds.
    #[arg(long)]
    predict_timeout: Option<u64>,

    /// `k=v;k2=v2` optionally followed by `==exact`, `~=prompt`, `^=url`, `?=query` or `!=error`.
    #[arg(long = "test-case", value_parser = args::parse_test_case)]
    test_cases: Vec<TestCaseConfig>,

    /// `k=v;k2=v2` supplied verbatim to every fuzz prediction.
    #[arg(long, value_parser = args::parse_inputs)]
    fuzz_fixed_inputs: Option<Inputs>,

    /// `a;b` inputs never supplied while fuzzing.
    #[arg(long, value_delimiter = ';')]
    fuzz_disabled_inputs: Vec<String>,

    #[arg(long)]
    fuzz_iterations: Option<u32>,

    /// Fuzzing time budget; 0 disables fuzzing.
    #[arg(long)]
    fuzz_seconds: Option<u64>,

    /// Extra guidance for fuzz input generation.
    #[arg(long)]
    fuzz_prompt: Option<String>,

    /// Concurrent fuzz predictions.
    #[arg(long)]
    parallel: Option<usize>,

    #[arg(long)]
    ignore_schema_compatibility: bool,

    /// Use the test model's latest version as is.
    #[arg(long)]
    skip_test_push: bool,

    /// Write the JSON report here.
    #[arg(long)]
    report: Option<String>,

    /// Directory holding cog.yaml.
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// -v info, -vv debug, -vvv trace. RUST_LOG wins when set.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn fuzz_overrides(&self) -> bool {
        self.fuzz_fixed_inputs.is_some()
            || !self.fuzz_disabled_inputs.is_empty()
            || self.fuzz_iterations.is_some()
            || self.fuzz_seconds.is_some()
            || self.fuzz_prompt.is_some()
    }

    /// Config file (if any) with command-line flags applied on top.
    fn into_config(self) -> Result<Config> {
        let path = self
            .config
            .clone()
            .or_else(|| Path::new(DEFAULT_CONFIG_FILE).exists().then(|| PathBuf::from(DEFAULT_CONFIG_FILE)));
        let mut cfg = match (&path, &self.model) {
            (Some(path), _) => Config::load_from(path)?,
            (None, Some(model)) => Config::for_model(model),
            (None, None) => anyhow::bail!("no model given and no {DEFAULT_CONFIG_FILE} found"),
        };
        if let Some(path) = &path {
            info!(config = %path.display(), "loaded config");
        }

        let fuzz_overrides = self.fuzz_overrides();
        if let Some(model) = self.model {
            cfg.model = model;
        }
        if let Some(test_model) = self.test_model {
            cfg.test_model = Some(test_model);
        }
        if let Some(hardware) = self.test_hardware {
            cfg.test_hardware = hardware;
        }
        if self.no_push {
            cfg.push = false;
        }
        if let Some(timeout) = self.predict_timeout {
            cfg.predict.predict_timeout = timeout;
        }
        if !self.test_cases.is_empty() {
            cfg.predict.test_cases = self.test_cases;
        }
        if let Some(parallel) = self.parallel {
            cfg.parallel = parallel;
        }
        cfg.ignore_schema_compatibility |= self.ignore_schema_compatibility;
        cfg.skip_test_push |= self.skip_test_push;

        if fuzz_overrides {
            let fuzz = cfg.predict.fuzz.get_or_insert_with(FuzzConfig::default);
            if let Some(fixed) = self.fuzz_fixed_inputs {
                fuzz.fixed_inputs = fixed;
            }
            if !self.fuzz_disabled_inputs.is_empty() {
                fuzz.disabled_inputs = self.fuzz_disabled_inputs;
            }
            if let Some(iterations) = self.fuzz_iterations {
                fuzz.iterations = Some(iterations);
            }
            if let Some(seconds) = self.fuzz_seconds {
                fuzz.duration = seconds;
            }
            if let Some(prompt) = self.fuzz_prompt {
                fuzz.prompt = Some(prompt);
            }
        }
        Ok(cfg)
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// `Ok(true)` iff validation passed.
async fn run(cli: Cli) -> Result<bool> {
    let report = cli.report.clone();
    let workdir = cli.workdir.clone();
    let config = cli.into_config()?;

    let platform = ReplicateClient::from_env().context("replicate client")?;
    let oracle = AnthropicOracle::from_env().context("oracle client")?;
    let fetcher = HttpFetcher::new(FETCH_TIMEOUT).context("media fetcher")?;
    let ports = Ports {
        platform: Arc::new(platform),
        oracle: Arc::new(oracle),
        fetcher: Arc::new(fetcher),
        linter: Arc::new(CogLinter::new(&workdir)),
        packager: Arc::new(CogCli::new(&workdir)),
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, letting in-flight predictions finish");
            let _ = stop_tx.send(true);
        }
    });

    let campaign = Campaign::new(ports, stop_rx);
    let verdict = campaign.run(&config).await?;

    print!("{}", render_summary(&verdict));
    if let Some(path) = report {
        let written = write_report(&verdict, &path)?;
        println!("report written to {}", written.display());
    }

    if let Some(reason) = &verdict.blocking_reason {
        eprintln!("not pushing: {reason}");
        return Ok(false);
    }
    if let Some(digest) = campaign.publish(&config, &verdict).await? {
        println!("pushed {} (sha256:{digest})", config.model);
    }
    Ok(true)
}
