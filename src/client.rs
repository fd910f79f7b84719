use crate::ui;
use alloy::primitives::Address;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use dao_dashboard::{
    ActionDispatcher,
    ActionKind,
    DaoAction,
    Session,
    SessionManager,
    config::{
        AppConfig,
        resolve_contract_address,
    },
    contract::AlloyDao,
    network::NetworkGuard,
    notify::{
        ChannelNotifier,
        Notice,
        Notifier,
    },
    provider::ProviderGateway,
    session::SessionWatch,
    wallets::{
        KeystoreAgent,
        PendingAuthorization,
        find_keystore,
    },
};
use deployments::{
    DeploymentEnv,
    DeploymentStore,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time,
};
use tracing::{
    debug,
    info,
    warn,
};

const REDRAW_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConnectionView {
    Disconnected,
    Connecting,
    Connected { account: Address, chain_id: u64 },
}

#[derive(Clone, Debug)]
pub struct DashboardSnapshot {
    pub env: DeploymentEnv,
    pub rpc_url: String,
    pub wallet: Option<String>,
    pub contract: Address,
    pub required_chain_id: u64,
    pub connection: ConnectionView,
    pub in_flight: Vec<ActionKind>,
}

pub struct AppController {
    config: AppConfig,
    session: Arc<SessionManager<KeystoreAgent>>,
    dispatcher: ActionDispatcher<AlloyDao>,
}

impl AppController {
    pub fn new(config: AppConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let store = DeploymentStore::new(config.env)
            .map_err(|e| eyre!("{e:#}"))
            .wrap_err("opening deployment store")?;
        let latest = store
            .latest()
            .map_err(|e| eyre!("{e:#}"))
            .wrap_err("reading deployment records")?;
        let contract =
            resolve_contract_address(config.contract, latest.as_ref(), config.env)?;
        info!(env = %config.env, %contract, rpc = %config.rpc_url, "dashboard configured");

        let agent = match config.wallet.as_deref() {
            Some(name) => {
                let descriptor = find_keystore(&config.wallet_dir, name)?;
                info!(wallet = %descriptor.label(), "using keystore");
                Some(KeystoreAgent::new(
                    descriptor,
                    &config.rpc_url,
                    config.receipt_timeout,
                )?)
            }
            None => {
                warn!("no wallet configured, connecting will fail");
                None
            }
        };

        let session = Arc::new(SessionManager::new(
            ProviderGateway::new(agent),
            NetworkGuard::new(config.required_chain_id),
            contract,
            notifier.clone(),
        ));
        let dispatcher = ActionDispatcher::new(session.subscribe(), notifier);
        Ok(Self {
            config,
            session,
            dispatcher,
        })
    }

    pub fn has_agent(&self) -> bool {
        self.session.gateway().detected()
    }

    pub fn subscribe(&self) -> SessionWatch<AlloyDao> {
        self.session.subscribe()
    }

    /// Connects before the terminal UI takes over, so the keystore password
    /// can be read with a normal terminal prompt.
    pub async fn auto_connect(&self) {
        if !self.has_agent() {
            return;
        }
        if let Err(err) = self.session.connect().await {
            debug!(error = %err, "startup connect did not complete");
        }
    }

    pub fn spawn_connect(&self, answer: PendingAuthorization) {
        if let Some(agent) = self.session.gateway().agent() {
            agent.stage(answer);
        }
        let session = self.session.clone();
        tokio::spawn(async move {
            if let Err(err) = session.connect().await {
                debug!(error = %err, "connect did not complete");
            }
        });
    }

    pub fn disconnect(&self) {
        self.session.disconnect();
    }

    pub fn submit(&self, action: DaoAction) {
        // outcome arrives as a notice
        let _ = self.dispatcher.spawn(action);
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        let connection = match self.session.current().as_ref() {
            Session::Disconnected => ConnectionView::Disconnected,
            Session::Connecting => ConnectionView::Connecting,
            Session::Connected(connection) => ConnectionView::Connected {
                account: connection.account,
                chain_id: connection.chain_id,
            },
        };
        DashboardSnapshot {
            env: self.config.env,
            rpc_url: self.config.rpc_url.clone(),
            wallet: self
                .session
                .gateway()
                .agent()
                .map(|agent| agent.descriptor().label()),
            contract: self.session.contract_address(),
            required_chain_id: self.session.required_chain_id(),
            connection,
            in_flight: self.dispatcher.in_flight(),
        }
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let (notifier, mut notices) = ChannelNotifier::new();
    let controller = AppController::new(config, Arc::new(notifier))?;
    controller.auto_connect().await;

    let mut ui_state = ui::UiState::default();
    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let mut input_events = ui::input_event_stream();
    let res = run_loop(&controller, &mut ui_state, &mut input_events, &mut notices).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop(
    controller: &AppController,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
    notices: &mut mpsc::UnboundedReceiver<Notice>,
) -> Result<()> {
    tracing::info!("Running app loop");
    let mut session_changes = controller.subscribe();
    let mut ticker = time::interval(REDRAW_INTERVAL);
    ui::draw(ui_state, &controller.snapshot()).wrap_err("initial draw failed")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(notice) = notices.recv() => {
                ui_state.push_notice(notice);
            }
            changed = session_changes.changed() => {
                if changed.is_err() {
                    warn!("session channel closed");
                    break;
                }
            }
            // keeps the pending list current while transactions confirm
            _ = ticker.tick() => {}
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::Connect(answer) => controller.spawn_connect(answer),
                    ui::UserEvent::Disconnect => controller.disconnect(),
                    ui::UserEvent::Submit(action) => {
                        info!(action = %action.kind(), "submitting");
                        controller.submit(action);
                    }
                    ui::UserEvent::InvalidInput(message) => {
                        warn!(%message, "rejected input");
                        ui_state.push_notice(Notice::error(message));
                    }
                }
            }
        }
        ui::draw(ui_state, &controller.snapshot()).wrap_err("redraw failed")?;
    }
    Ok(())
}
