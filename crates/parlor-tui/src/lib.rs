//! Terminal UI for chatting with a persona by text and voice.

mod app;
mod client;
mod event;
mod event_bus;
mod playback;
mod ui;

pub use app::{App, MICROPHONE_ALERT};
pub use client::{ChatClient, RECORDING_DISCARDED};
pub use event::AppEvent;
pub use event_bus::EventBus;
pub use playback::Player;

use anyhow::anyhow;
use crossterm::event::{
    DisableMouseCapture, EnableMouseCapture, Event as CrosstermEvent, KeyCode, KeyEvent,
    KeyEventKind, KeyModifiers, KeyboardEnhancementFlags, MouseEventKind,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use log::{debug, info, warn};
use parlor_config::{PersonaConfig, UiConfig};
use parlor_core::{ChatEvent, ScrollDecision, ScrollTracker};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::{self, Stdout};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Runtime options for the TUI.
#[derive(Debug, Clone)]
pub struct TuiConfig {
    /// Persona texts.
    pub persona: PersonaConfig,
    /// Scroll tuning.
    pub ui: UiConfig,
    /// Interval between health probes.
    pub health_interval: Duration,
}

/// Launch the Parlor TUI.
///
/// The caller is responsible for:
/// - Building the conversation, monitor and recorder with `events` as their sink
/// - Initializing logging (e.g. `env_logger`) before calling `run`
///
/// # Errors
/// Returns an error if terminal setup or the event loop fails.
pub async fn run(mut client: ChatClient, events: EventBus, config: TuiConfig) -> anyhow::Result<()> {
    let context = client.conversation().context().clone();
    let tracker = ScrollTracker::new(
        u32::from(config.ui.near_bottom_rows),
        config.ui.scroll_settle(),
    );
    let mut app = App::new(config.persona, &context, tracker);
    app.set_status(client.status());
    info!(
        "starting tui (session_id={}, audio_supported={})",
        context.session_id, context.audio_supported
    );

    let mut terminal = setup_terminal()?;
    let (tx, mut rx) = mpsc::channel(256);
    let forwarder = events.forward(tx.clone());
    spawn_input_handler(tx.clone());
    spawn_tick(tx.clone());
    let _monitor = client.start_monitor(config.health_interval);
    client.load_history();

    let mut settle: Option<JoinHandle<()>> = None;
    let result = async {
        loop {
            terminal.draw(|frame| ui::draw(frame, &mut app))?;
            let event = rx
                .recv()
                .await
                .ok_or_else(|| anyhow!("event channel closed unexpectedly"))?;
            if handle_app_event(event, &mut client, &mut app, tx.clone(), &mut settle).await? {
                break;
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    forwarder.abort();
    if let Some(handle) = settle.take() {
        handle.abort();
    }
    restore_terminal(&mut terminal)?;
    result
}

/// Dispatch a UI event and return true when the app should exit.
async fn handle_app_event(
    event: AppEvent,
    client: &mut ChatClient,
    app: &mut App,
    sender: mpsc::Sender<AppEvent>,
    settle: &mut Option<JoinHandle<()>>,
) -> anyhow::Result<bool> {
    match event {
        AppEvent::Input(key) => handle_input(key, client, app, sender).await,
        AppEvent::Chat(event) => {
            apply_chat_event(event, client, app, sender, settle);
            Ok(false)
        }
        AppEvent::Resync => {
            sync_messages(client, app, sender, settle);
            app.set_pending(client.is_pending());
            app.set_status(client.status());
            if !client.is_recording() {
                app.recording_stopped();
            }
            Ok(false)
        }
        AppEvent::ScrollSettled => {
            settle.take();
            app.jump_to_bottom();
            Ok(false)
        }
        AppEvent::ActionError(message) => {
            app.show_alert(message);
            Ok(false)
        }
        AppEvent::Scroll(delta) => {
            if delta < 0 {
                app.scroll_up(delta.unsigned_abs());
            } else if delta > 0 {
                app.scroll_down(delta as u16);
            }
            Ok(false)
        }
        AppEvent::Tick => {
            app.on_tick();
            Ok(false)
        }
    }
}

/// Apply a conversation event to the UI state.
fn apply_chat_event(
    event: ChatEvent,
    client: &mut ChatClient,
    app: &mut App,
    sender: mpsc::Sender<AppEvent>,
    settle: &mut Option<JoinHandle<()>>,
) {
    match event {
        ChatEvent::MessagesChanged { .. } => sync_messages(client, app, sender, settle),
        ChatEvent::PendingChanged(pending) => app.set_pending(pending),
        ChatEvent::StatusChanged(status) => app.set_status(status),
        ChatEvent::RecordingTick { elapsed_secs } => app.recording_tick(elapsed_secs),
        ChatEvent::RecordingStopped => app.recording_stopped(),
        ChatEvent::RecordingFailed(reason) => {
            warn!("recording failed (reason={reason})");
            client.clear_failed_recording();
            app.recording_stopped();
            app.show_alert(MICROPHONE_ALERT);
        }
    }
}

/// Pull the latest store snapshot and follow it per the scroll decision.
fn sync_messages(
    client: &ChatClient,
    app: &mut App,
    sender: mpsc::Sender<AppEvent>,
    settle: &mut Option<JoinHandle<()>>,
) {
    let (revision, messages) = client.conversation().store().versioned_snapshot();
    if revision == app.revision {
        return;
    }
    if let Some(handle) = settle.take() {
        handle.abort();
    }
    if let ScrollDecision::Settle(delay) = app.sync_messages(messages, revision) {
        *settle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sender.send(AppEvent::ScrollSettled).await;
        }));
    }
}

/// Handle keyboard input and dispatch actions.
async fn handle_input(
    key: KeyEvent,
    client: &mut ChatClient,
    app: &mut App,
    sender: mpsc::Sender<AppEvent>,
) -> anyhow::Result<bool> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && key.code == KeyCode::Char('c') {
        return Ok(true);
    }
    if key.code == KeyCode::Esc {
        return Ok(!app.dismiss_alert());
    }
    if app.alert.is_some() {
        if key.code == KeyCode::Enter {
            app.dismiss_alert();
        }
        return Ok(false);
    }

    match key.code {
        KeyCode::Char('r') if ctrl => toggle_recording(client, app, sender).await,
        KeyCode::Char('l') if ctrl => {
            client.clear_history();
        }
        KeyCode::Char('b') if ctrl => app.jump_to_bottom(),
        KeyCode::Char('p') if ctrl => {
            if let Some(url) = app.latest_audio_url().map(str::to_string)
                && let Err(err) = client.play(&url)
            {
                warn!("playback failed (error={err:#})");
                app.show_alert(format!("Could not play the audio reply: {err}"));
            }
        }
        KeyCode::Char('j') if ctrl => app.insert_newline(),
        KeyCode::Enter
            if key
                .modifiers
                .intersects(KeyModifiers::SHIFT | KeyModifiers::ALT) =>
        {
            app.insert_newline();
        }
        KeyCode::Enter => send_message(client, app),
        KeyCode::PageUp => app.scroll_up(5),
        KeyCode::PageDown => app.scroll_down(5),
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),
        KeyCode::Home => app.scroll_to_top(),
        KeyCode::End => app.jump_to_bottom(),
        KeyCode::Backspace => app.backspace(),
        KeyCode::Char(ch) if !ctrl => app.insert_char(ch),
        _ => {}
    }

    Ok(false)
}

/// Send the input buffer as a text message.
fn send_message(client: &ChatClient, app: &mut App) {
    let Some(text) = app.take_input() else {
        return;
    };
    debug!("sending message (len={})", text.len());
    if !client.send_text(text.clone()) {
        app.input = text;
    }
}

/// Start or stop a recording.
async fn toggle_recording(client: &mut ChatClient, app: &mut App, sender: mpsc::Sender<AppEvent>) {
    if app.recording.is_some() || client.is_recording() {
        client.stop_recording(sender);
        app.recording_stopped();
        return;
    }
    if !app.can_record() {
        debug!(
            "recording unavailable (supported={}, pending={})",
            app.audio_supported, app.pending
        );
        return;
    }
    match client.start_recording().await {
        Ok(()) => app.recording_started(),
        Err(err) => {
            warn!("failed to start recording (error={err})");
            app.show_alert(MICROPHONE_ALERT);
        }
    }
}

/// Spawn a task to poll for input events.
fn spawn_input_handler(sender: mpsc::Sender<AppEvent>) {
    tokio::spawn(async move {
        const MOUSE_SCROLL_LINES: i16 = 3;
        loop {
            if matches!(crossterm::event::poll(Duration::from_millis(30)), Ok(true)) {
                while matches!(crossterm::event::poll(Duration::from_millis(0)), Ok(true)) {
                    let event = match crossterm::event::read() {
                        Ok(event) => event,
                        Err(_) => break,
                    };
                    match event {
                        CrosstermEvent::Key(key) if key.kind != KeyEventKind::Release => {
                            let _ = sender.send(AppEvent::Input(key)).await;
                        }
                        CrosstermEvent::Mouse(mouse) => {
                            let lines = if mouse.modifiers.contains(KeyModifiers::SHIFT) {
                                MOUSE_SCROLL_LINES.saturating_mul(2)
                            } else {
                                MOUSE_SCROLL_LINES
                            };
                            match mouse.kind {
                                MouseEventKind::ScrollUp => {
                                    let _ = sender.send(AppEvent::Scroll(-lines)).await;
                                }
                                MouseEventKind::ScrollDown => {
                                    let _ = sender.send(AppEvent::Scroll(lines)).await;
                                }
                                _ => {}
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    });
}

/// Spawn a periodic tick event generator.
fn spawn_tick(sender: mpsc::Sender<AppEvent>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(250));
        loop {
            interval.tick().await;
            if sender.send(AppEvent::Tick).await.is_err() {
                break;
            }
        }
    });
}

/// Configure terminal in raw mode with alternate screen.
fn setup_terminal() -> anyhow::Result<Terminal<CrosstermBackend<Stdout>>> {
    debug!("setting up terminal");
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    // Needed to tell Shift+Enter apart from Enter.
    if matches!(supports_keyboard_enhancement(), Ok(true)) {
        execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )?;
    }
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restore terminal state on exit.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    debug!("restoring terminal");
    if matches!(supports_keyboard_enhancement(), Ok(true)) {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)?;
    }
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_core::{
        AudioCaptureController, CaptureConstraints, ChatApi, ClientContext, ConnectivityMonitor,
        Conversation, ConversationTimings, SharedMessageStore, StatusCell,
    };
    use parlor_protocol::{AudioReply, ConnectivityStatus, EventSink, MessageKind, Role};
    use parlor_test_utils::{ApiCall, Scripted, ScriptedApi, ScriptedCapture};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    struct Harness {
        api: Arc<ScriptedApi>,
        capture: ScriptedCapture,
        client: ChatClient,
        app: App,
        tx: mpsc::Sender<AppEvent>,
        rx: mpsc::Receiver<AppEvent>,
        settle: Option<JoinHandle<()>>,
    }

    impl Harness {
        fn new(capture: ScriptedCapture) -> Self {
            let api = Arc::new(ScriptedApi::new());
            let chat_api: Arc<dyn ChatApi> = api.clone();
            let bus = EventBus::new(256);
            let events: Arc<dyn EventSink> = Arc::new(bus.clone());
            let monitor = ConnectivityMonitor::new(chat_api.clone(), StatusCell::new(), events.clone());
            let recorder = AudioCaptureController::new(
                Arc::new(capture.clone()),
                CaptureConstraints::default(),
                events.clone(),
            );
            let context = ClientContext::new(
                "session_test",
                "http://localhost:8000",
                recorder.is_supported(),
            );
            let conversation = Conversation::new(
                chat_api,
                SharedMessageStore::new(),
                monitor.clone(),
                events,
                context.clone(),
                ConversationTimings::default(),
            );
            let client = ChatClient::new(
                conversation,
                monitor,
                recorder,
                Player::new(vec!["true".to_string()]),
            );
            let app = App::new(
                PersonaConfig::default(),
                &context,
                ScrollTracker::new(3, Duration::from_millis(100)),
            );
            let (tx, rx) = mpsc::channel(256);
            bus.forward(tx.clone());
            Self {
                api,
                capture,
                client,
                app,
                tx,
                rx,
                settle: None,
            }
        }

        async fn key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> bool {
            self.dispatch(AppEvent::Input(KeyEvent::new(code, modifiers)))
                .await
        }

        async fn dispatch(&mut self, event: AppEvent) -> bool {
            handle_app_event(
                event,
                &mut self.client,
                &mut self.app,
                self.tx.clone(),
                &mut self.settle,
            )
            .await
            .expect("handle event")
        }

        async fn type_text(&mut self, text: &str) {
            for ch in text.chars() {
                self.key(KeyCode::Char(ch), KeyModifiers::NONE).await;
            }
        }

        /// Feed queued events into the app until `done` holds.
        async fn pump_until(&mut self, done: impl Fn(&App) -> bool) {
            for _ in 0..100 {
                if done(&self.app) {
                    return;
                }
                let event = tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
                    .await
                    .expect("event in time")
                    .expect("channel open");
                self.dispatch(event).await;
            }
            panic!("condition not reached");
        }
    }

    #[tokio::test]
    async fn enter_sends_typed_message() {
        let mut h = Harness::new(ScriptedCapture::new(Vec::new()));
        h.api.reply_text("The Earth is round.", "2024-05-01T10:00:00");

        h.type_text("Is the Earth flat?").await;
        h.key(KeyCode::Enter, KeyModifiers::NONE).await;
        assert!(h.app.input.is_empty());

        h.pump_until(|app| app.messages.len() == 2 && !app.pending)
            .await;
        assert_eq!(h.app.messages[0].content, "Is the Earth flat?");
        assert_eq!(h.app.messages[1].role, Role::Assistant);
        assert_eq!(h.app.messages[1].content, "The Earth is round.");
    }

    #[tokio::test]
    async fn modified_enter_inserts_newline() {
        let mut h = Harness::new(ScriptedCapture::new(Vec::new()));
        h.type_text("first").await;
        h.key(KeyCode::Enter, KeyModifiers::SHIFT).await;
        h.type_text("second").await;
        h.key(KeyCode::Enter, KeyModifiers::ALT).await;
        h.key(KeyCode::Char('j'), KeyModifiers::CONTROL).await;

        assert_eq!(h.app.input, "first\nsecond\n\n");
        assert!(h.api.calls().is_empty());
    }

    #[tokio::test]
    async fn blank_input_is_not_sent() {
        let mut h = Harness::new(ScriptedCapture::new(Vec::new()));
        h.type_text("   ").await;
        h.key(KeyCode::Enter, KeyModifiers::NONE).await;

        assert_eq!(h.app.input, "   ");
        assert_eq!(h.api.send_count(), 0);
    }

    #[tokio::test]
    async fn recording_round_trip_sends_voice_turn() {
        let mut h = Harness::new(ScriptedCapture::new(vec![vec![1, 2, 3]]));
        h.api.push_audio(Scripted::Reply(AudioReply {
            transcribed_text: "hello there".to_string(),
            response_text: "general kenobi".to_string(),
            timestamp: "2024-05-01T10:00:00".to_string(),
            audio_url: "/chat/audio/1.mp3".to_string(),
        }));

        h.key(KeyCode::Char('r'), KeyModifiers::CONTROL).await;
        assert_eq!(h.app.recording, Some(0));
        h.key(KeyCode::Char('r'), KeyModifiers::CONTROL).await;
        assert_eq!(h.app.recording, None);

        h.pump_until(|app| app.messages.len() == 2 && !app.pending)
            .await;
        assert_eq!(h.app.messages[0].kind, MessageKind::Audio);
        assert_eq!(h.app.messages[0].content, "hello there");
        assert_eq!(
            h.app.latest_audio_url(),
            Some("http://localhost:8000/chat/audio/1.mp3")
        );
        assert!(h.capture.released());
    }

    #[tokio::test]
    async fn denied_microphone_shows_alert() {
        let mut h = Harness::new(ScriptedCapture::denied("permission denied"));

        h.key(KeyCode::Char('r'), KeyModifiers::CONTROL).await;
        assert_eq!(h.app.alert.as_deref(), Some(MICROPHONE_ALERT));
        assert_eq!(h.app.recording, None);

        // Esc dismisses the alert instead of quitting.
        assert!(!h.key(KeyCode::Esc, KeyModifiers::NONE).await);
        assert_eq!(h.app.alert, None);
        assert!(h.key(KeyCode::Esc, KeyModifiers::NONE).await);
    }

    #[tokio::test]
    async fn failing_device_shows_alert_and_stops_recording() {
        let mut h = Harness::new(ScriptedCapture::failing("no such device"));

        h.key(KeyCode::Char('r'), KeyModifiers::CONTROL).await;
        h.pump_until(|app| app.alert.is_some()).await;

        assert_eq!(h.app.alert.as_deref(), Some(MICROPHONE_ALERT));
        assert_eq!(h.app.recording, None);
        assert!(!h.client.is_recording());
        assert!(h.capture.released());

        // Once dismissed, recording can be retried.
        h.key(KeyCode::Enter, KeyModifiers::NONE).await;
        h.key(KeyCode::Char('r'), KeyModifiers::CONTROL).await;
        assert_eq!(h.capture.open_count(), 2);
    }

    #[tokio::test]
    async fn record_toggle_is_gated_by_capability() {
        let mut h = Harness::new(ScriptedCapture::unsupported());

        h.key(KeyCode::Char('r'), KeyModifiers::CONTROL).await;

        assert_eq!(h.app.recording, None);
        assert_eq!(h.app.alert, None);
        assert_eq!(h.capture.open_count(), 0);
    }

    #[tokio::test]
    async fn record_toggle_is_disabled_while_pending() {
        let mut h = Harness::new(ScriptedCapture::new(vec![vec![1]]));
        h.api.push_chat(Scripted::Hang);

        h.type_text("hi").await;
        h.key(KeyCode::Enter, KeyModifiers::NONE).await;
        h.pump_until(|app| app.pending).await;
        h.key(KeyCode::Char('r'), KeyModifiers::CONTROL).await;

        assert_eq!(h.app.recording, None);
        assert_eq!(h.capture.open_count(), 0);
    }

    #[tokio::test]
    async fn ctrl_l_clears_history() {
        let mut h = Harness::new(ScriptedCapture::new(Vec::new()));
        h.api.reply_text("reply", "2024-05-01T10:00:00");
        h.type_text("hi").await;
        h.key(KeyCode::Enter, KeyModifiers::NONE).await;
        h.pump_until(|app| app.messages.len() == 2).await;

        h.key(KeyCode::Char('l'), KeyModifiers::CONTROL).await;
        h.pump_until(|app| app.messages.is_empty()).await;

        assert!(h.api.calls().contains(&ApiCall::ClearHistory {
            session_id: "session_test".to_string(),
        }));
    }

    #[tokio::test]
    async fn status_changes_reach_the_status_strip() {
        let mut h = Harness::new(ScriptedCapture::new(Vec::new()));
        assert_eq!(h.app.status, ConnectivityStatus::Checking);

        let _monitor = h.client.start_monitor(Duration::from_secs(30));
        h.pump_until(|app| app.status == ConnectivityStatus::Connected)
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn settled_reply_scrolls_to_bottom() {
        let mut h = Harness::new(ScriptedCapture::new(Vec::new()));
        h.api.push_history(Scripted::Reply(
            (0..20)
                .map(|idx| {
                    parlor_protocol::Message::assistant(format!("m{idx}"), "2024-05-01T10:00:00")
                })
                .collect(),
        ));
        h.client.load_history().await.expect("join");
        h.pump_until(|app| app.messages.len() == 20).await;
        h.app.update_scroll_bounds(60, 10);
        assert_eq!(h.app.scroll, 0);
        assert!(h.settle.is_some());

        h.pump_until(|app| app.scroll == 50).await;
        assert!(h.settle.is_none());
    }
}
