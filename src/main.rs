//! Runs the reference scenario catalog against a vault/strategy pair on a forked chain.
//!
//! Configuration is env-driven (`.env` is loaded first without overriding the process
//! environment). Exits non-zero when any scenario does not pass.

use std::path::Path;
use std::process::ExitCode;

use vault_harness::adapter::anvil::{AnvilChain, AnvilOptions};
use vault_harness::adapter::evm::{RevmChain, RevmOptions};
use vault_harness::adapter::{Artifact, ChainAdapter};
use vault_harness::error::{AdapterError, SetupError};
use vault_harness::fixture::FixtureInputs;
use vault_harness::fork_db::ForkDB;
use vault_harness::funding::ReserveBook;
use vault_harness::report::SuiteReport;
use vault_harness::scenario::catalog;
use vault_harness::scenario::{RunSettings, Scenario};
use vault_harness::session::{run_isolated, Session, SessionSettings};
use vault_harness::utils::config::{Backend, HarnessConfig};
use vault_harness::utils::error::compact_error_message;

const ERROR_MESSAGE_MAX_LEN: usize = 240;

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

struct SessionPlan {
    reserves: ReserveBook,
    inputs: FixtureInputs,
    settings: SessionSettings,
}

impl SessionPlan {
    fn from_config(config: &HarnessConfig) -> anyhow::Result<Self> {
        let vault_artifact = Artifact::from_json_file(&config.vault_artifact)?;
        let strategy_artifact = Artifact::from_json_file(&config.strategy_artifact)?;
        tracing::info!(
            "[STARTUP] Artifacts loaded: vault `{}` ({} bytes), strategy `{}` ({} bytes)",
            vault_artifact.name,
            vault_artifact.bytecode.len(),
            strategy_artifact.name,
            strategy_artifact.bytecode.len()
        );
        Ok(Self {
            reserves: ReserveBook::new(config.reserves.iter().copied()),
            inputs: FixtureInputs {
                want: config.want_token,
                wrapped_native: config.wrapped_native,
                protected: config.protected_tokens.clone(),
                vault_artifact,
                strategy_artifact,
                config: config.fixture.clone(),
            },
            settings: SessionSettings {
                run: RunSettings {
                    relative_approx: config.relative_approx,
                    ..RunSettings::default()
                },
                governance: config.governance,
            },
        })
    }

    fn open<A: ChainAdapter>(&self, adapter: A) -> Result<Session<A>, SetupError> {
        Session::open(
            adapter,
            self.reserves.clone(),
            self.inputs.clone(),
            self.settings.clone(),
        )
    }
}

fn connect_failure(err: anyhow::Error) -> SetupError {
    SetupError::adapter(
        "connect",
        AdapterError::Transport(compact_error_message(&err.to_string(), ERROR_MESSAGE_MAX_LEN)),
    )
}

fn run_with<A, F>(
    plan: &SessionPlan,
    scenarios: &[Scenario],
    backend: &str,
    parallel: bool,
    connect: F,
) -> anyhow::Result<SuiteReport>
where
    A: ChainAdapter,
    F: Fn() -> anyhow::Result<A> + Sync,
{
    let open = || connect().map_err(connect_failure).and_then(|adapter| plan.open(adapter));
    if parallel {
        tracing::info!(
            "[STARTUP] Running {} scenarios on isolated sessions",
            scenarios.len()
        );
        return Ok(run_isolated(scenarios, backend, open));
    }
    let mut session = open()?;
    Ok(session.run_suite(scenarios, backend))
}

fn run(config: &HarnessConfig) -> anyhow::Result<SuiteReport> {
    let scenarios = catalog::select(
        catalog::reference_catalog(config.fixture.profit_unlock_secs),
        config.scenarios.as_deref(),
    )?;
    let plan = SessionPlan::from_config(config)?;

    let mut suite = match config.backend {
        Backend::Revm => {
            let Some(url) = config.fork_rpc_url.as_deref() else {
                anyhow::bail!("FORK_RPC_URL must be set for the revm backend");
            };
            let options = RevmOptions {
                chain_id: config.chain.chain_id,
                block_time_secs: config.block_time_secs,
                pool_size: config.account_pool_size,
                test_mode: config.test_mode,
                ..RevmOptions::default()
            };
            run_with(&plan, &scenarios, "revm", config.parallel, || {
                let db = ForkDB::connect(url, config.fork_block_number, config.rpc_timeout_ms)?;
                Ok(RevmChain::forked(db, options.clone())?)
            })?
        }
        Backend::Anvil => {
            if config.parallel {
                tracing::warn!(
                    "[STARTUP] HARNESS_PARALLEL ignored: anvil sessions share one node, running sequentially"
                );
            }
            let options = AnvilOptions {
                timeout_ms: config.rpc_timeout_ms,
                test_mode: config.test_mode,
            };
            run_with(&plan, &scenarios, "anvil", false, || {
                AnvilChain::connect(&config.anvil_rpc_url, options.clone())
            })?
        }
    };
    suite.chain_id = Some(config.chain.chain_id);
    suite.fork_block = config.fork_block_number;
    Ok(suite)
}

fn main() -> anyhow::Result<ExitCode> {
    let applied = vault_harness::utils::env_guard::load_dot_env(Path::new(".env"));
    init_tracing();
    if applied > 0 {
        tracing::info!("[ENV] Applied {} variables from .env", applied);
    }

    let config = HarnessConfig::load()?;
    tracing::info!(
        "[STARTUP] backend={:?} chain={} ({}) want={:?} test_mode={}",
        config.backend,
        config.chain.name,
        config.chain.chain_id,
        config.want_token,
        config.test_mode
    );

    let suite = run(&config)?;
    for report in &suite.scenarios {
        println!("{}", report.summary_line());
    }
    if let Some(path) = &config.report_path {
        suite.write_json(path)?;
        tracing::info!("[STARTUP] Report written to {}", path.display());
    }

    let failed = suite.failures().count();
    println!(
        "{} passed, {} failed",
        suite.scenarios.len() - failed,
        failed
    );
    Ok(if suite.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
