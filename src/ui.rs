use crate::client::{
    ConnectionView,
    DashboardSnapshot,
};
use alloy::primitives::{
    Address,
    U256,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEvent,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use dao_dashboard::{
    ActionKind,
    DaoAction,
    notify::{
        Notice,
        NoticeLevel,
    },
    wallets::PendingAuthorization,
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::{
    collections::VecDeque,
    io::stdout,
};
use tokio::sync::mpsc;

const NOTICE_LOG_LEN: usize = 50;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UserEvent {
    Quit,
    Redraw,
    Connect(PendingAuthorization),
    Disconnect,
    Submit(DaoAction),
    InvalidInput(String),
}

pub struct UiState {
    mode: Mode,
    connection: ConnectionView,
    pending_notices: VecDeque<Notice>,
    notice_log: VecDeque<Notice>,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

impl Default for UiState {
    fn default() -> Self {
        UiState {
            mode: Mode::Normal,
            connection: ConnectionView::Disconnected,
            pending_notices: VecDeque::new(),
            notice_log: VecDeque::with_capacity(NOTICE_LOG_LEN),
            terminal: None,
        }
    }
}

impl UiState {
    /// Queues a notice for the modal and keeps it in the log.
    pub fn push_notice(&mut self, notice: Notice) {
        if self.notice_log.len() == NOTICE_LOG_LEN {
            self.notice_log.pop_front();
        }
        self.notice_log.push_back(notice.clone());
        self.pending_notices.push_back(notice);
    }

    fn current_notice(&self) -> Option<&Notice> {
        self.pending_notices.front()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
enum Mode {
    #[default]
    Normal,
    Password(String),
    Applicant(String),
    Proposal(String),
    ProposalId { kind: ActionKind, input: String },
    Quit,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // One Terminal for the whole run so buffers diff across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

/// Blocking crossterm reads on a dedicated thread, forwarded to the async loop.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let ev = event::read();
            let failed = ev.is_err();
            if tx.send(ev).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(rx: &mut InputEventReceiver) -> Result<Event> {
    match rx.recv().await {
        Some(ev) => Ok(ev?),
        None => Err(eyre!("terminal input closed")),
    }
}

pub fn draw(state: &mut UiState, snap: &DashboardSnapshot) -> Result<()> {
    state.connection = snap.connection.clone();
    if !matches!(state.connection, ConnectionView::Connected { .. })
        && matches!(
            state.mode,
            Mode::Applicant(_) | Mode::Proposal(_) | Mode::ProposalId { .. }
        )
    {
        state.mode = Mode::Normal;
    }
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

fn edit_text(input: &mut String, code: KeyCode) -> bool {
    match code {
        KeyCode::Backspace => {
            input.pop();
            true
        }
        KeyCode::Char(c) => {
            input.push(c);
            true
        }
        _ => false,
    }
}

fn parse_applicant(raw: &str) -> std::result::Result<Address, String> {
    raw.trim()
        .parse::<Address>()
        .map_err(|_| format!("'{}' is not a valid address", raw.trim()))
}

fn parse_proposal_id(raw: &str) -> std::result::Result<U256, String> {
    raw.trim()
        .parse::<U256>()
        .map_err(|_| format!("'{}' is not a valid proposal id", raw.trim()))
}

fn proposal_action(kind: ActionKind, id: U256) -> Option<DaoAction> {
    match kind {
        ActionKind::VoteOnProposal => Some(DaoAction::VoteOnProposal(id)),
        ActionKind::VoteAgainstProposal => Some(DaoAction::VoteAgainstProposal(id)),
        ActionKind::CloseVoting => Some(DaoAction::CloseVoting(id)),
        _ => None,
    }
}

fn submit_or_reject(
    parsed: std::result::Result<DaoAction, String>,
) -> Option<UserEvent> {
    Some(match parsed {
        Ok(action) => UserEvent::Submit(action),
        Err(message) => UserEvent::InvalidInput(message),
    })
}

/// Maps a terminal event to a user intent, updating modal state on the way.
/// `None` means the event changed nothing.
pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let k = match event {
        Event::Key(k) if k.kind == KeyEventKind::Press => k,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if is_interrupt(&k) {
        return Some(UserEvent::Quit);
    }

    if state.current_notice().is_some() {
        return match k.code {
            KeyCode::Enter | KeyCode::Esc => {
                state.pending_notices.pop_front();
                Some(UserEvent::Redraw)
            }
            _ => None,
        };
    }

    match &mut state.mode {
        Mode::Normal => interpret_normal(state, k.code),
        Mode::Quit => match k.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                Some(UserEvent::Quit)
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::Password(input) => match k.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Connect(PendingAuthorization::Dismissed))
            }
            KeyCode::Enter => {
                let password = std::mem::take(input);
                state.mode = Mode::Normal;
                Some(UserEvent::Connect(PendingAuthorization::Password(password)))
            }
            code => edit_text(input, code).then_some(UserEvent::Redraw),
        },
        Mode::Applicant(input) => match k.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let parsed = parse_applicant(input).map(DaoAction::ApproveMembership);
                state.mode = Mode::Normal;
                submit_or_reject(parsed)
            }
            code => edit_text(input, code).then_some(UserEvent::Redraw),
        },
        Mode::Proposal(input) => match k.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let description = input.trim().to_string();
                state.mode = Mode::Normal;
                if description.is_empty() {
                    Some(UserEvent::InvalidInput(
                        "Proposal description cannot be empty".to_string(),
                    ))
                } else {
                    Some(UserEvent::Submit(DaoAction::CreateProposal(description)))
                }
            }
            code => edit_text(input, code).then_some(UserEvent::Redraw),
        },
        Mode::ProposalId { kind, input } => match k.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let kind = *kind;
                let parsed = parse_proposal_id(input).and_then(|id| {
                    proposal_action(kind, id)
                        .ok_or_else(|| format!("{kind} does not take a proposal id"))
                });
                state.mode = Mode::Normal;
                submit_or_reject(parsed)
            }
            KeyCode::Char(c) if !c.is_ascii_alphanumeric() => None,
            code => edit_text(input, code).then_some(UserEvent::Redraw),
        },
    }
}

fn is_interrupt(k: &KeyEvent) -> bool {
    k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c')
}

fn interpret_normal(state: &mut UiState, code: KeyCode) -> Option<UserEvent> {
    let KeyCode::Char(c) = code else {
        return None;
    };
    if c == 'q' {
        state.mode = Mode::Quit;
        return Some(UserEvent::Redraw);
    }
    match state.connection {
        ConnectionView::Disconnected if c == 'c' => {
            state.mode = Mode::Password(String::new());
            return Some(UserEvent::Redraw);
        }
        ConnectionView::Connected { .. } => {}
        // a connect is already underway
        _ => return None,
    }
    let proposal_kind = match c {
        'a' => return Some(UserEvent::Submit(DaoAction::ApplyForMembership)),
        'd' => return Some(UserEvent::Disconnect),
        'p' => {
            state.mode = Mode::Applicant(String::new());
            return Some(UserEvent::Redraw);
        }
        'n' => {
            state.mode = Mode::Proposal(String::new());
            return Some(UserEvent::Redraw);
        }
        'y' => ActionKind::VoteOnProposal,
        'v' => ActionKind::VoteAgainstProposal,
        'x' => ActionKind::CloseVoting,
        _ => return None,
    };
    state.mode = Mode::ProposalId {
        kind: proposal_kind,
        input: String::new(),
    };
    Some(UserEvent::Redraw)
}

fn ui(f: &mut Frame, state: &UiState, snap: &DashboardSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7), // connection
            Constraint::Length(11),
            Constraint::Min(5), // notice log
        ])
        .split(f.area());

    draw_connection_panel(f, chunks[0], snap);
    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[1]);
    draw_actions_panel(f, middle[0], snap);
    draw_pending_panel(f, middle[1], snap);
    draw_notice_log(f, chunks[2], state);
    draw_modals(f, state);
}

fn draw_connection_panel(f: &mut Frame, area: Rect, snap: &DashboardSnapshot) {
    let (status, style) = match &snap.connection {
        ConnectionView::Disconnected => ("Disconnected", Style::default().fg(Color::Red)),
        ConnectionView::Connecting => ("Connecting...", Style::default().fg(Color::Yellow)),
        ConnectionView::Connected { .. } => ("Connected", Style::default().fg(Color::Green)),
    };
    let account = match &snap.connection {
        ConnectionView::Connected { account, .. } => account.to_string(),
        _ => "-".to_string(),
    };
    let chain = match &snap.connection {
        ConnectionView::Connected { chain_id, .. } => {
            format!("{chain_id} (required {})", snap.required_chain_id)
        }
        _ => format!("- (required {})", snap.required_chain_id),
    };
    let lines = vec![
        Line::from(vec![Span::raw("Status:   "), Span::styled(status, style)]),
        Line::from(format!(
            "Wallet:   {}",
            snap.wallet.as_deref().unwrap_or("none configured")
        )),
        Line::from(format!("Account:  {account}")),
        Line::from(format!("Chain:    {chain}")),
        Line::from(format!("Contract: {}", snap.contract)),
    ];
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("MyDAO | {} | {}", snap.env, snap.rpc_url));
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_actions_panel(f: &mut Frame, area: Rect, snap: &DashboardSnapshot) {
    let lines: Vec<Line> = if matches!(snap.connection, ConnectionView::Connected { .. }) {
        vec![
            Line::from("a  apply for membership"),
            Line::from("p  approve membership (address)"),
            Line::from("n  create proposal (description)"),
            Line::from("y  vote for proposal (id)"),
            Line::from("v  vote against proposal (id)"),
            Line::from("x  close voting (id)"),
            Line::from("d  disconnect"),
            Line::from("q  quit"),
        ]
    } else if snap.connection == ConnectionView::Connecting {
        vec![
            Line::styled("waiting for the wallet...", Style::default().fg(Color::Yellow)),
            Line::from("q  quit"),
        ]
    } else {
        vec![Line::from("c  connect wallet"), Line::from("q  quit")]
    };
    let block = Block::default().borders(Borders::ALL).title("Actions");
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_pending_panel(f: &mut Frame, area: Rect, snap: &DashboardSnapshot) {
    let lines: Vec<Line> = if snap.in_flight.is_empty() {
        vec![Line::styled("nothing pending", Style::default().fg(Color::DarkGray))]
    } else {
        snap.in_flight
            .iter()
            .map(|kind| Line::from(format!("{kind}: waiting for confirmation")))
            .collect()
    };
    let block = Block::default().borders(Borders::ALL).title("Pending");
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn level_style(level: NoticeLevel) -> Style {
    match level {
        NoticeLevel::Info => Style::default().fg(Color::Green),
        NoticeLevel::Warning => Style::default().fg(Color::Yellow),
        NoticeLevel::Error => Style::default().fg(Color::Red),
    }
}

fn draw_notice_log(f: &mut Frame, area: Rect, state: &UiState) {
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = state
        .notice_log
        .iter()
        .rev()
        .take(visible)
        .map(|notice| Line::styled(notice.to_string(), level_style(notice.level)))
        .collect();
    let block = Block::default().borders(Borders::ALL).title("Notices");
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_text_modal(f: &mut Frame, title: &str, body: String) {
    let area = centered_rect(60, 25, f.area());
    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    f.render_widget(Clear, area);
    f.render_widget(block.clone(), area);
    f.render_widget(
        Paragraph::new(body).wrap(Wrap { trim: false }),
        block.inner(area),
    );
}

fn draw_modals(f: &mut Frame, state: &UiState) {
    match &state.mode {
        Mode::Password(input) => draw_text_modal(
            f,
            "Unlock Wallet",
            format!(
                "Password: {}\nEnter=unlock Esc=cancel",
                "*".repeat(input.chars().count())
            ),
        ),
        Mode::Applicant(input) => draw_text_modal(
            f,
            "Approve Membership",
            format!("Applicant address: {input}\nEnter=submit Esc=cancel"),
        ),
        Mode::Proposal(input) => draw_text_modal(
            f,
            "Create Proposal",
            format!("Description: {input}\nEnter=submit Esc=cancel"),
        ),
        Mode::ProposalId { kind, input } => {
            let title = match kind {
                ActionKind::VoteOnProposal => "Vote For",
                ActionKind::VoteAgainstProposal => "Vote Against",
                _ => "Close Voting",
            };
            draw_text_modal(
                f,
                title,
                format!("Proposal id: {input}\nEnter=submit Esc=cancel"),
            )
        }
        Mode::Quit => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit the dashboard? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
    }

    // notices sit on top of everything
    if let Some(notice) = state.current_notice() {
        let area = centered_rect(60, 25, f.area());
        let title = match notice.level {
            NoticeLevel::Info => "Success",
            NoticeLevel::Warning => "Warning",
            NoticeLevel::Error => "Error",
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(level_style(notice.level))
            .title(title);
        let body = vec![
            Line::from(notice.message.clone()),
            Line::from(""),
            Line::styled("Enter/Esc to dismiss", Style::default().fg(Color::DarkGray)),
        ];
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(
            Paragraph::new(body).wrap(Wrap { trim: false }),
            block.inner(area),
        );
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}
