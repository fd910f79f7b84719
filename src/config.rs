use crate::{
    DEFAULT_CONTRACT_ADDRESS,
    wallets::resolve_wallet_dir,
};
use alloy::primitives::Address;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::{
    DeploymentEnv,
    DeploymentRecord,
};
use std::{
    path::PathBuf,
    time::Duration,
};

pub const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 300;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AppConfig {
    pub env: DeploymentEnv,
    pub rpc_url: String,
    pub required_chain_id: u64,
    pub contract: Option<Address>,
    pub wallet: Option<String>,
    pub wallet_dir: PathBuf,
    pub receipt_timeout: Option<Duration>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Run(AppConfig),
    Help,
}

pub fn usage() -> String {
    format!(
        "Usage: dao-dashboard [--mumbai | --local] [--rpc-url <url>] [--chain-id <id>]\n\
         [--contract <address>] [--wallet <name>] [--wallet-dir <path>]\n\
         [--receipt-timeout <secs>]\n\
         \n\
         Flags:\n\
           --mumbai                 Use Polygon Mumbai (default RPC {})\n\
           --local                  Use a local node (default RPC {})\n\
           --rpc-url <url>          Override the RPC URL for the selected network\n\
           --chain-id <id>          Require a different chain id\n\
           --contract <address>     MyDAO address (defaults to the latest recorded deployment)\n\
           --wallet <name>          Keystore to sign with; without it the dashboard cannot connect\n\
           --wallet-dir <path>      Keystore directory (defaults to ~/.dao-dashboard/wallets)\n\
           --receipt-timeout <secs> Stop waiting for a receipt after this long, 0 waits forever (default {})",
        deployments::DEFAULT_MUMBAI_RPC_URL,
        deployments::DEFAULT_LOCAL_RPC_URL,
        DEFAULT_RECEIPT_TIMEOUT_SECS,
    )
}

fn set_once<T>(slot: &mut Option<T>, value: T, flag: &str) -> Result<()> {
    if slot.is_some() {
        return Err(eyre!("{flag} may only be specified once"));
    }
    *slot = Some(value);
    Ok(())
}

pub fn parse_args<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut env: Option<DeploymentEnv> = None;
    let mut rpc_url: Option<String> = None;
    let mut chain_id: Option<u64> = None;
    let mut contract: Option<Address> = None;
    let mut wallet: Option<String> = None;
    let mut wallet_dir: Option<String> = None;
    let mut receipt_timeout: Option<u64> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mumbai" | "--local" => {
                let selected = if arg == "--mumbai" {
                    DeploymentEnv::Mumbai
                } else {
                    DeploymentEnv::Local
                };
                if env.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --mumbai/--local"
                    ));
                }
                env = Some(selected);
            }
            "--rpc-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--rpc-url requires a URL argument"))?;
                set_once(&mut rpc_url, url, "--rpc-url")?;
            }
            "--chain-id" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--chain-id requires a number"))?;
                let id = raw
                    .parse::<u64>()
                    .wrap_err_with(|| format!("invalid chain id '{raw}'"))?;
                set_once(&mut chain_id, id, "--chain-id")?;
            }
            "--contract" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--contract requires an address"))?;
                let address = raw
                    .parse::<Address>()
                    .wrap_err_with(|| format!("invalid contract address '{raw}'"))?;
                set_once(&mut contract, address, "--contract")?;
            }
            "--wallet" => {
                let name = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet requires a wallet name"))?;
                set_once(&mut wallet, name, "--wallet")?;
            }
            "--wallet-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet-dir requires a path argument"))?;
                set_once(&mut wallet_dir, dir, "--wallet-dir")?;
            }
            "--receipt-timeout" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--receipt-timeout requires seconds"))?;
                let secs = raw
                    .parse::<u64>()
                    .wrap_err_with(|| format!("invalid receipt timeout '{raw}'"))?;
                set_once(&mut receipt_timeout, secs, "--receipt-timeout")?;
            }
            "--help" | "-h" => return Ok(Command::Help),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let env = env.unwrap_or(DeploymentEnv::Mumbai);
    let receipt_timeout = match receipt_timeout.unwrap_or(DEFAULT_RECEIPT_TIMEOUT_SECS) {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    Ok(Command::Run(AppConfig {
        env,
        rpc_url: rpc_url.unwrap_or_else(|| env.default_rpc_url().to_string()),
        required_chain_id: chain_id.unwrap_or_else(|| env.chain_id()),
        contract,
        wallet,
        wallet_dir: resolve_wallet_dir(wallet_dir.as_deref())?,
        receipt_timeout,
    }))
}

/// `--contract` wins, then the newest recorded deployment, then the
/// well-known Mumbai instance.
pub fn resolve_contract_address(
    explicit: Option<Address>,
    latest: Option<&DeploymentRecord>,
    env: DeploymentEnv,
) -> Result<Address> {
    if let Some(address) = explicit {
        return Ok(address);
    }
    if let Some(record) = latest {
        return record.contract_address.parse::<Address>().wrap_err_with(|| {
            format!(
                "deployment record holds an invalid address '{}'",
                record.contract_address
            )
        });
    }
    match env {
        DeploymentEnv::Mumbai => Ok(DEFAULT_CONTRACT_ADDRESS),
        DeploymentEnv::Local => Err(eyre!(
            "No MyDAO deployment recorded for {env}; run dao-deploy --local or pass --contract"
        )),
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn run(raw: &[&str]) -> AppConfig {
        match parse_args(args(raw)).unwrap() {
            Command::Run(config) => config,
            Command::Help => panic!("expected a run command"),
        }
    }

    #[test]
    fn parse_args__defaults_to_mumbai() {
        let config = run(&[]);

        assert_eq!(config.env, DeploymentEnv::Mumbai);
        assert_eq!(config.rpc_url, deployments::DEFAULT_MUMBAI_RPC_URL);
        assert_eq!(config.required_chain_id, 80001);
        assert_eq!(config.contract, None);
        assert_eq!(config.wallet, None);
        assert_eq!(config.receipt_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn parse_args__local_overrides() {
        let config = run(&[
            "--local",
            "--rpc-url",
            "http://node:8545",
            "--wallet",
            "alice",
            "--wallet-dir",
            "/tmp/keys",
            "--receipt-timeout",
            "0",
        ]);

        assert_eq!(config.env, DeploymentEnv::Local);
        assert_eq!(config.rpc_url, "http://node:8545");
        assert_eq!(config.required_chain_id, 31337);
        assert_eq!(config.wallet.as_deref(), Some("alice"));
        assert_eq!(config.wallet_dir, PathBuf::from("/tmp/keys"));
        assert_eq!(config.receipt_timeout, None);
    }

    #[test]
    fn parse_args__chain_id_overrides_network_default() {
        let config = run(&["--mumbai", "--chain-id", "137"]);

        assert_eq!(config.required_chain_id, 137);
    }

    #[test]
    fn parse_args__rejects_conflicting_networks() {
        assert!(parse_args(args(&["--mumbai", "--local"])).is_err());
    }

    #[test]
    fn parse_args__rejects_bad_values() {
        assert!(parse_args(args(&["--contract", "0x123"])).is_err());
        assert!(parse_args(args(&["--chain-id", "mumbai"])).is_err());
        assert!(parse_args(args(&["--wallet"])).is_err());
        assert!(parse_args(args(&["--frobnicate"])).is_err());
    }

    #[test]
    fn parse_args__help() {
        assert_eq!(parse_args(args(&["--help"])).unwrap(), Command::Help);
    }

    #[test]
    fn resolve_contract_address__prefers_flag_then_record_then_default() {
        let flag = Address::repeat_byte(0x01);
        let record = DeploymentRecord::new(
            "MyDAO",
            Address::repeat_byte(0x02).to_string(),
            "hash",
            "http://127.0.0.1:8545",
            31337,
        );

        assert_eq!(
            resolve_contract_address(Some(flag), Some(&record), DeploymentEnv::Local)
                .unwrap(),
            flag
        );
        assert_eq!(
            resolve_contract_address(None, Some(&record), DeploymentEnv::Local).unwrap(),
            Address::repeat_byte(0x02)
        );
        assert_eq!(
            resolve_contract_address(None, None, DeploymentEnv::Mumbai).unwrap(),
            DEFAULT_CONTRACT_ADDRESS
        );
        assert!(resolve_contract_address(None, None, DeploymentEnv::Local).is_err());
    }
}
