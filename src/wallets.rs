use crate::{
    contract::AlloyDao,
    errors::{
        DashboardError,
        Result,
    },
    provider::SigningAgent,
};
use alloy::{
    network::EthereumWallet,
    primitives::Address,
    providers::{
        DynProvider,
        Provider,
        ProviderBuilder,
    },
    signers::local::{
        MnemonicBuilder,
        PrivateKeySigner,
        coins_bip39::English,
    },
    transports::http::reqwest::Url,
};
use color_eyre::eyre::{
    self,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use serde::Deserialize;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::Mutex,
    time::Duration,
};
use tracing::{
    debug,
    info,
    warn,
};

const KEYSTORE_EXTENSION: &str = "json";
const MIN_MNEMONIC_WORDS: usize = 12;

const DEFAULT_WALLET_DIR: &str = "~/.dao-dashboard/wallets";

/// The unencrypted part of a Web3 Secret Storage file. Geth and most wallets
/// write the account address next to the ciphertext.
#[derive(Deserialize)]
struct KeystoreHeader {
    #[serde(default)]
    address: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeystoreDescriptor {
    pub name: String,
    pub path: PathBuf,
    /// Account recorded in the file, known before the keystore is unlocked.
    pub address: Option<Address>,
}

impl KeystoreDescriptor {
    /// `None` unless `path` is a `.json` file.
    pub fn open(path: PathBuf) -> Option<Self> {
        if !path.is_file()
            || path.extension().and_then(|ext| ext.to_str()) != Some(KEYSTORE_EXTENSION)
        {
            return None;
        }
        let name = path.file_stem()?.to_str()?.to_owned();
        let address = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<KeystoreHeader>(&raw).ok())
            .and_then(|header| header.address)
            .and_then(|raw| parse_keystore_address(&raw));
        Some(Self {
            name,
            path,
            address,
        })
    }

    pub fn label(&self) -> String {
        match self.address {
            Some(address) => format!("{} ({address})", self.name),
            None => self.name.clone(),
        }
    }
}

// geth omits the 0x prefix
fn parse_keystore_address(raw: &str) -> Option<Address> {
    let digits = raw.trim().trim_start_matches("0x");
    format!("0x{digits}").parse().ok()
}

/// Expands `~` and environment variables; `None` selects
/// `~/.dao-dashboard/wallets`.
pub fn resolve_wallet_dir(dir: Option<&str>) -> eyre::Result<PathBuf> {
    let raw = dir.unwrap_or(DEFAULT_WALLET_DIR);
    let expanded = shellexpand::full(raw)
        .wrap_err_with(|| format!("cannot expand wallet directory '{raw}'"))?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// Keystores in `dir`, sorted by name. A missing directory holds none.
pub fn list_keystores(dir: &Path) -> eyre::Result<Vec<KeystoreDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir)
        .wrap_err_with(|| format!("reading keystore directory {}", dir.display()))?;
    let mut keystores = Vec::new();
    for entry in entries {
        let entry = entry.wrap_err("reading keystore directory entry")?;
        keystores.extend(KeystoreDescriptor::open(entry.path()));
    }
    keystores.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(keystores)
}

pub fn find_keystore(dir: &Path, name: &str) -> eyre::Result<KeystoreDescriptor> {
    let keystores = list_keystores(dir)?;
    let known = keystores
        .iter()
        .map(|keystore| keystore.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    keystores
        .iter()
        .find(|keystore| keystore.name == name)
        .cloned()
        .ok_or_else(|| {
            eyre!(
                "no keystore named '{name}' in {} (available: {})",
                dir.display(),
                if known.is_empty() { "none" } else { known.as_str() }
            )
        })
}

/// Keystores hold either a raw 32-byte key or a BIP-39 phrase; phrases
/// derive the first account on the standard Ethereum path.
pub fn signer_from_secret(secret: &[u8]) -> eyre::Result<PrivateKeySigner> {
    if secret.len() == 32
        && let Ok(signer) = PrivateKeySigner::from_slice(secret)
    {
        return Ok(signer);
    }

    if let Ok(mnemonic) = std::str::from_utf8(secret) {
        let word_count = mnemonic.split_whitespace().count();
        if word_count >= MIN_MNEMONIC_WORDS {
            let signer = MnemonicBuilder::<English>::default()
                .phrase(mnemonic.trim())
                .index(0)?
                .build()?;
            return Ok(signer);
        }
    }

    Err(eyre!("unsupported key material"))
}

pub fn unlock_signer(
    descriptor: &KeystoreDescriptor,
    password: &str,
) -> eyre::Result<PrivateKeySigner> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| eyre!("Invalid password for wallet '{}'", descriptor.name))?;
    let signer = signer_from_secret(&secret).wrap_err_with(|| {
        format!(
            "Wallet '{}' contained unsupported key material",
            descriptor.name
        )
    })?;
    if let Some(recorded) = descriptor.address
        && recorded != signer.address()
    {
        warn!(
            wallet = %descriptor.name,
            %recorded,
            derived = %signer.address(),
            "keystore header names a different account"
        );
    }
    Ok(signer)
}

/// Terminal prompt; only usable while the terminal is in cooked mode.
pub fn prompt_unlock(descriptor: &KeystoreDescriptor) -> eyre::Result<PrivateKeySigner> {
    let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
    let password = prompt_password(prompt).wrap_err("Failed to read wallet password")?;
    unlock_signer(descriptor, &password)
}

pub fn parse_rpc_url(raw: &str) -> eyre::Result<Url> {
    raw.parse()
        .wrap_err_with(|| format!("invalid RPC URL '{raw}'"))
}

pub fn signing_provider(signer: PrivateKeySigner, rpc_url: Url) -> DynProvider {
    ProviderBuilder::new()
        .wallet(EthereumWallet::from(signer))
        .connect_http(rpc_url)
        .erased()
}

/// What the user answered in the dashboard's password dialog.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PendingAuthorization {
    Password(String),
    Dismissed,
}

struct Unlocked {
    account: Address,
    provider: DynProvider,
}

/// Signing agent backed by an encrypted keystore file. The key is decrypted
/// on each account request and the resulting signer lives until the agent is
/// dropped.
pub struct KeystoreAgent {
    descriptor: KeystoreDescriptor,
    rpc_url: Url,
    reader: DynProvider,
    receipt_timeout: Option<Duration>,
    pending: Mutex<Option<PendingAuthorization>>,
    unlocked: Mutex<Option<Unlocked>>,
}

impl KeystoreAgent {
    pub fn new(
        descriptor: KeystoreDescriptor,
        rpc_url: &str,
        receipt_timeout: Option<Duration>,
    ) -> eyre::Result<Self> {
        let rpc_url = parse_rpc_url(rpc_url)?;
        let reader = ProviderBuilder::new().connect_http(rpc_url.clone()).erased();
        Ok(Self {
            descriptor,
            rpc_url,
            reader,
            receipt_timeout,
            pending: Mutex::new(None),
            unlocked: Mutex::new(None),
        })
    }

    pub fn descriptor(&self) -> &KeystoreDescriptor {
        &self.descriptor
    }

    /// Supplies the answer for the next `request_accounts` so it does not
    /// fall back to a terminal prompt.
    pub fn stage(&self, answer: PendingAuthorization) {
        *self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(answer);
    }

    pub fn account(&self) -> Option<Address> {
        self.unlocked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|unlocked| unlocked.account)
    }

    fn take_staged(&self) -> Option<PendingAuthorization> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    async fn read_password(&self) -> Result<String> {
        let answer = match self.take_staged() {
            Some(answer) => answer,
            None => {
                let prompt =
                    format!("Enter password for wallet '{}': ", self.descriptor.name);
                let read = tokio::task::spawn_blocking(move || prompt_password(prompt))
                    .await
                    .map_err(|e| DashboardError::Unknown(e.to_string()))?;
                match read {
                    Ok(password) => PendingAuthorization::Password(password),
                    Err(err) => {
                        warn!(error = %err, "password prompt failed");
                        PendingAuthorization::Dismissed
                    }
                }
            }
        };
        match answer {
            PendingAuthorization::Password(password) if !password.is_empty() => {
                Ok(password)
            }
            _ => Err(DashboardError::AuthorizationDenied(format!(
                "unlock of wallet '{}' was dismissed",
                self.descriptor.name
            ))),
        }
    }
}

impl SigningAgent for KeystoreAgent {
    type Contract = AlloyDao;

    async fn request_accounts(&self) -> Result<Vec<Address>> {
        let password = self.read_password().await?;
        let descriptor = self.descriptor.clone();
        debug!(wallet = %descriptor.name, "decrypting keystore");
        let signer =
            tokio::task::spawn_blocking(move || unlock_signer(&descriptor, &password))
                .await
                .map_err(|e| DashboardError::Unknown(e.to_string()))?
                .map_err(|e| DashboardError::AuthorizationDenied(e.to_string()))?;

        let account = signer.address();
        let provider = signing_provider(signer, self.rpc_url.clone());
        *self
            .unlocked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) =
            Some(Unlocked { account, provider });
        info!(wallet = %self.descriptor.name, %account, "wallet unlocked");
        Ok(vec![account])
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.reader.get_chain_id().await?)
    }

    fn discard_pending(&self) {
        if self.take_staged().is_some() {
            debug!(wallet = %self.descriptor.name, "discarded unused password");
        }
    }

    fn bind_contract(&self, address: Address) -> Result<AlloyDao> {
        let unlocked = self
            .unlocked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let unlocked = unlocked.as_ref().ok_or_else(|| {
            DashboardError::AuthorizationDenied("wallet is locked".into())
        })?;
        Ok(AlloyDao::new(
            address,
            unlocked.provider.clone(),
            self.receipt_timeout,
        ))
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::contract::DaoContract;
    use alloy::primitives::address;
    use tempdir::TempDir;

    const HARDHAT_ACCOUNT_0: Address =
        address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

    const HARDHAT_KEY_0: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn agent_at(path: PathBuf) -> KeystoreAgent {
        KeystoreAgent::new(
            KeystoreDescriptor::open(path).unwrap(),
            "http://127.0.0.1:8545",
            None,
        )
        .unwrap()
    }

    fn agent_for(tmp: &TempDir) -> KeystoreAgent {
        let path = tmp.path().join("alice.json");
        fs::write(&path, "{}").unwrap();
        agent_at(path)
    }

    /// Encrypts the first hardhat account into `<name>.json`.
    fn hardhat_keystore(tmp: &TempDir, name: &str, password: &str) -> PathBuf {
        let file = format!("{name}.json");
        eth_keystore::encrypt_key(
            tmp.path(),
            &mut rand::thread_rng(),
            alloy::hex::decode(HARDHAT_KEY_0).unwrap(),
            password,
            Some(&file),
        )
        .unwrap();
        tmp.path().join(file)
    }

    #[test]
    fn signer_from_secret__accepts_raw_private_key() {
        let key = alloy::hex::decode(HARDHAT_KEY_0).unwrap();

        let signer = signer_from_secret(&key).unwrap();

        assert_eq!(signer.address(), HARDHAT_ACCOUNT_0);
    }

    #[test]
    fn signer_from_secret__derives_first_mnemonic_account() {
        let phrase = b"test test test test test test test test test test test junk";

        let signer = signer_from_secret(phrase).unwrap();

        assert_eq!(signer.address(), HARDHAT_ACCOUNT_0);
    }

    #[test]
    fn signer_from_secret__rejects_short_phrases() {
        assert!(signer_from_secret(b"not a wallet").is_err());
    }

    #[test]
    fn list_keystores__returns_sorted_keystores_only() {
        // given
        let tmp = TempDir::new("dao-wallets").unwrap();
        fs::write(tmp.path().join("bob.json"), "{}").unwrap();
        fs::write(tmp.path().join("alice.json"), "{}").unwrap();
        fs::write(tmp.path().join("notes.txt"), "").unwrap();
        fs::create_dir(tmp.path().join("nested.json")).unwrap();

        // when
        let keystores = list_keystores(tmp.path()).unwrap();

        // then
        let names: Vec<_> = keystores.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        assert!(find_keystore(tmp.path(), "bob").is_ok());
        let missing = find_keystore(tmp.path(), "carol").unwrap_err();
        assert!(missing.to_string().contains("available: alice, bob"));
    }

    #[test]
    fn list_keystores__missing_dir_is_empty() {
        let tmp = TempDir::new("dao-wallets").unwrap();

        let keystores = list_keystores(&tmp.path().join("absent")).unwrap();

        assert!(keystores.is_empty());
    }

    #[test]
    fn open__reads_account_from_keystore_header() {
        // given
        let tmp = TempDir::new("dao-wallets").unwrap();
        let geth = tmp.path().join("geth.json");
        fs::write(
            &geth,
            r#"{"address":"f39fd6e51aad88f6f4ce6ab8827279cfffb92266","version":3}"#,
        )
        .unwrap();
        let bare = tmp.path().join("bare.json");
        fs::write(&bare, r#"{"version":3}"#).unwrap();

        // when
        let geth = KeystoreDescriptor::open(geth).unwrap();
        let bare = KeystoreDescriptor::open(bare).unwrap();

        // then
        assert_eq!(geth.address, Some(HARDHAT_ACCOUNT_0));
        assert_eq!(geth.label(), format!("geth ({HARDHAT_ACCOUNT_0})"));
        assert_eq!(bare.address, None);
        assert_eq!(bare.label(), "bare");
    }

    #[test]
    fn resolve_wallet_dir__expands_tilde() {
        let home = std::env::var("HOME").unwrap();

        let dir = resolve_wallet_dir(Some("~/keys")).unwrap();

        assert_eq!(dir, PathBuf::from(home).join("keys"));
    }

    #[tokio::test]
    async fn request_accounts__dismissed_dialog_is_denied() {
        // given
        let tmp = TempDir::new("dao-wallets").unwrap();
        let agent = agent_for(&tmp);
        agent.stage(PendingAuthorization::Dismissed);

        // when
        let result = agent.request_accounts().await;

        // then
        assert!(matches!(result, Err(DashboardError::AuthorizationDenied(_))));
        assert_eq!(agent.account(), None);
    }

    #[tokio::test]
    async fn request_accounts__empty_password_is_denied() {
        let tmp = TempDir::new("dao-wallets").unwrap();
        let agent = agent_for(&tmp);
        agent.stage(PendingAuthorization::Password(String::new()));

        let result = agent.request_accounts().await;

        assert!(matches!(result, Err(DashboardError::AuthorizationDenied(_))));
    }

    #[tokio::test]
    async fn request_accounts__undecryptable_keystore_is_denied() {
        let tmp = TempDir::new("dao-wallets").unwrap();
        let agent = agent_for(&tmp);
        agent.stage(PendingAuthorization::Password("hunter2".into()));

        let result = agent.request_accounts().await;

        assert!(matches!(result, Err(DashboardError::AuthorizationDenied(_))));
        assert!(matches!(
            agent.bind_contract(Address::ZERO),
            Err(DashboardError::AuthorizationDenied(_))
        ));
    }

    #[tokio::test]
    async fn request_accounts__correct_password_unlocks_and_binds() {
        // given
        let tmp = TempDir::new("dao-wallets").unwrap();
        let agent = agent_at(hardhat_keystore(&tmp, "deployer", "correct horse"));
        agent.stage(PendingAuthorization::Password("correct horse".into()));
        let dao_address = Address::repeat_byte(0x42);

        // when
        let accounts = agent.request_accounts().await.unwrap();
        let dao = agent.bind_contract(dao_address).unwrap();

        // then
        assert_eq!(accounts, vec![HARDHAT_ACCOUNT_0]);
        assert_eq!(agent.account(), Some(HARDHAT_ACCOUNT_0));
        assert_eq!(dao.address(), dao_address);
    }

    #[tokio::test]
    async fn discard_pending__drops_staged_password() {
        // given
        let tmp = TempDir::new("dao-wallets").unwrap();
        let agent = agent_for(&tmp);
        agent.stage(PendingAuthorization::Password("hunter2".into()));

        // when
        agent.discard_pending();

        // then
        assert_eq!(agent.take_staged(), None);
    }
}
