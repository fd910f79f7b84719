use alloy::providers::Provider;
use anyhow::{
    Context,
    Result,
};
use clap::{
    ArgGroup,
    Parser,
};
use dao_dashboard::{
    config::DEFAULT_RECEIPT_TIMEOUT_SECS,
    deployer::{
        AlloyFactory,
        ContractArtifact,
        DEFAULT_ARTIFACT_PATH,
        deploy,
        record_deployment,
    },
    wallets::{
        find_keystore,
        parse_rpc_url,
        prompt_unlock,
        resolve_wallet_dir,
        signing_provider,
    },
};
use deployments::{
    DeploymentEnv,
    DeploymentRecord,
    DeploymentStore,
};
use std::{
    path::PathBuf,
    time::Duration,
};
use tracing::{
    info,
    warn,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "dao-deploy",
    about = "Deploy the MyDAO contract or show the latest recorded deployment",
    version,
    group(ArgGroup::new("network").args(["mumbai", "local"]))
)]
struct Args {
    /// Deploy to Polygon Mumbai (default)
    #[arg(long)]
    mumbai: bool,

    /// Deploy to a local node
    #[arg(long)]
    local: bool,

    /// Override RPC URL
    #[arg(long, env = "DAO_RPC_URL")]
    rpc_url: Option<String>,

    /// Keystore name to deploy from
    #[arg(long, env = "DAO_WALLET", default_value = "deployer")]
    wallet: String,

    /// Override keystore directory (defaults to ~/.dao-dashboard/wallets)
    #[arg(long, env = "DAO_WALLET_DIR")]
    wallet_dir: Option<String>,

    /// Hardhat compilation artifact for the contract
    #[arg(long, env = "DAO_ARTIFACT", default_value = DEFAULT_ARTIFACT_PATH)]
    artifact: PathBuf,

    /// Seconds to wait for the creation receipt, 0 waits forever
    #[arg(long, env = "DAO_RECEIPT_TIMEOUT", default_value_t = DEFAULT_RECEIPT_TIMEOUT_SECS)]
    receipt_timeout: u64,

    /// Which action to perform (defaults to deploy)
    #[arg(short, long, value_enum, default_value = "deploy")]
    action: Action,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum Action {
    Deploy,
    Latest,
}

/// The library reports errors as eyre; keep the whole chain in the message.
fn report(e: impl std::fmt::Display) -> anyhow::Error {
    anyhow::anyhow!("{e:#}")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    deployments::ensure_structure().context("initializing deployment directories")?;

    let env = if args.local {
        DeploymentEnv::Local
    } else {
        DeploymentEnv::Mumbai
    };
    let store = DeploymentStore::new(env).context("opening deployment store")?;

    if let Action::Latest = args.action {
        let record = latest_record(&store)?;
        println!(
            "{} contract deployed to: {}",
            record.contract_name, record.contract_address
        );
        println!("  deployed at {} on chain {}", record.deployed_at, record.chain_id);
        if let Some(tx) = record.tx_hash.as_deref() {
            println!("  transaction {tx}");
        }
        if let Ok(artifact) = ContractArtifact::load(&args.artifact)
            && let Ok(code) = artifact.bytecode()
            && !record.is_compatible_with_hash(&deployments::compute_bytecode_hash(&code))
        {
            println!(
                "  recorded bytecode differs from {}, redeploy to pick up changes",
                args.artifact.display()
            );
        }
        return Ok(());
    }

    let rpc_url = args
        .rpc_url
        .clone()
        .unwrap_or_else(|| env.default_rpc_url().to_string());
    let artifact = ContractArtifact::load(&args.artifact).map_err(report)?;

    let wallet_dir = resolve_wallet_dir(args.wallet_dir.as_deref())
        .map_err(report)
        .context("resolving wallet directory")?;
    let descriptor = find_keystore(&wallet_dir, &args.wallet)
        .map_err(report)
        .context("locating requested wallet")?;
    let signer = prompt_unlock(&descriptor)
        .map_err(report)
        .context("unlocking keystore")?;
    let deployer = signer.address();

    let provider = signing_provider(signer, parse_rpc_url(&rpc_url).map_err(report)?);
    let chain_id = provider
        .get_chain_id()
        .await
        .context("failed to connect to provider")?;
    if chain_id != env.chain_id() {
        warn!(
            expected = env.chain_id(),
            actual = chain_id,
            "RPC endpoint reports an unexpected chain id"
        );
    }
    info!(%deployer, chain_id, rpc = %rpc_url, "deploying");

    let receipt_timeout = match args.receipt_timeout {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let factory = AlloyFactory::new(provider, receipt_timeout);
    let deployed = deploy(&factory, &artifact, &mut std::io::stdout())
        .await
        .map_err(report)?;

    record_deployment(
        &store,
        &artifact,
        &deployed,
        &rpc_url,
        chain_id,
        Some(deployer),
    )
    .map_err(report)?;
    info!(path = %store.path().display(), "deployment recorded");
    Ok(())
}

fn latest_record(store: &DeploymentStore) -> Result<DeploymentRecord> {
    store
        .latest()
        .context("loading deployment records")?
        .ok_or_else(|| anyhow::anyhow!("no deployments found for this environment"))
}
