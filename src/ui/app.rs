use std::io::stdout;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use ratatui_image::{picker::Picker, protocol::StatefulProtocol};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use tui_input::backend::crossterm::EventHandler;
use tui_input::Input;

use crate::config::{Config, UiColors};
use crate::detail::{self, ContactDetail, DetailError, SelectTicket};
use crate::directory::{self, DirectoryError, SectionGroup};
use crate::screen::{LoadTicket, Screen};
use crate::source::ContactSource;

use super::{draw, photo};

const DEFAULT_FONT_SIZE: (u16, u16) = (8, 16);
const TICK: Duration = Duration::from_millis(50);
const PAGE: isize = 5;

fn create_image_picker() -> Picker {
    let mut picker = base_picker();
    picker.guess_protocol();
    picker
}

#[cfg(unix)]
fn base_picker() -> Picker {
    Picker::from_termios().unwrap_or_else(|_| Picker::new(DEFAULT_FONT_SIZE))
}

#[cfg(not(unix))]
fn base_picker() -> Picker {
    Picker::new(DEFAULT_FONT_SIZE)
}

/// Result of a source call started by the app, delivered back to the loop.
enum Completion {
    Loaded(LoadTicket, Result<Vec<SectionGroup>, DirectoryError>),
    Selected(SelectTicket, Result<ContactDetail, DetailError>),
}

/// Open the interactive screen. Must run inside a `tokio::task::LocalSet`.
pub async fn run<S: ContactSource + 'static>(source: S, config: &Config) -> Result<()> {
    let mut app = App::new(Rc::new(source), config, create_image_picker());
    app.run().await
}

pub struct App<'a, S> {
    source: Rc<S>,
    config: &'a Config,
    pub screen: Screen,
    pub search_input: Input,
    completions_tx: UnboundedSender<Completion>,
    completions_rx: UnboundedReceiver<Completion>,
    in_flight: usize,
    image_picker: Picker,
    image_state: Option<Box<dyn StatefulProtocol>>,
    photo_error: Option<String>,
}

impl<'a, S: ContactSource + 'static> App<'a, S> {
    pub fn new(source: Rc<S>, config: &'a Config, image_picker: Picker) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            source,
            config,
            screen: Screen::new(),
            search_input: Input::default(),
            completions_tx,
            completions_rx,
            in_flight: 0,
            image_picker,
            image_state: None,
            photo_error: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        info!(vdir = %self.config.vdir.display(), "contacts screen opened");
        self.start();
        let result = self.event_loop(&mut terminal).await;

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    async fn event_loop<B>(&mut self, terminal: &mut Terminal<B>) -> Result<()>
    where
        B: ratatui::backend::Backend,
    {
        loop {
            draw::render(terminal, self)?;

            while event::poll(Duration::ZERO)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key(key) {
                        return Ok(());
                    }
                }
            }

            let completion = tokio::select! {
                completion = self.completions_rx.recv() => completion,
                _ = tokio::time::sleep(TICK) => None,
            };
            if let Some(completion) = completion {
                self.apply(completion);
                while let Ok(completion) = self.completions_rx.try_recv() {
                    self.apply(completion);
                }
            }
        }
    }

    /// Issue the initial load for the empty search term.
    pub fn start(&mut self) {
        let ticket = self.screen.begin_load();
        self.spawn_load(ticket);
    }

    fn spawn_load(&mut self, ticket: LoadTicket) {
        let source = Rc::clone(&self.source);
        let tx = self.completions_tx.clone();
        let limit = self.config.source_timeout;
        self.in_flight += 1;
        tokio::task::spawn_local(async move {
            let result = directory::load(source.as_ref(), ticket.term(), limit).await;
            let _ = tx.send(Completion::Loaded(ticket, result));
        });
    }

    fn spawn_select(&mut self, ticket: SelectTicket, id: String) {
        let source = Rc::clone(&self.source);
        let tx = self.completions_tx.clone();
        let limit = self.config.source_timeout;
        self.in_flight += 1;
        tokio::task::spawn_local(async move {
            let result = detail::fetch(source.as_ref(), &id, limit).await;
            let _ = tx.send(Completion::Selected(ticket, result));
        });
    }

    fn apply(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match completion {
            Completion::Loaded(ticket, result) => {
                let outcome = self.screen.finish_load(ticket, result);
                debug!(?outcome, "load completed");
            }
            Completion::Selected(ticket, result) => {
                if self.screen.finish_select(ticket, result) {
                    self.refresh_photo();
                }
            }
        }
    }

    /// Wait until every spawned call has reported back.
    #[cfg(test)]
    async fn settle(&mut self) {
        while self.in_flight > 0 {
            match self.completions_rx.recv().await {
                Some(completion) => self.apply(completion),
                None => break,
            }
        }
    }

    fn refresh_photo(&mut self) {
        self.image_state = None;
        self.photo_error = None;

        let Some(image) = self.screen.detail().detail().and_then(|d| d.image.clone()) else {
            return;
        };
        match photo::decode(&image) {
            Ok(Some(decoded)) => {
                self.image_state = Some(self.image_picker.new_resize_protocol(decoded));
            }
            Ok(None) => {}
            Err(err) => {
                let message = format!("{err:#}");
                warn!(error = %message, "contact photo could not be decoded");
                self.photo_error = Some("PHOTO COULD NOT BE DECODED".to_string());
            }
        }
    }

    /// Returns `true` when the app should quit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        // Ctrl+C always quits (hardcoded for safety)
        if key.modifiers.contains(KeyModifiers::CONTROL)
            && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('C'))
        {
            return true;
        }

        let config = self.config;
        let keys = &config.keys;

        if self.screen.notice().is_some() {
            if key_matches_any(&key, &keys.quit) {
                return true;
            }
            if key_matches_any(&key, &keys.dismiss) {
                self.screen.dismiss_notice();
            }
            return false;
        }

        if self.screen.detail().is_panel_visible() {
            if key_matches_any(&key, &keys.quit) {
                return true;
            }
            if key_matches_any(&key, &keys.close) {
                self.screen.close_detail();
            }
            return false;
        }

        self.handle_list_key(key)
    }

    fn handle_list_key(&mut self, key: KeyEvent) -> bool {
        let config = self.config;
        let keys = &config.keys;

        if key_matches_any(&key, &keys.quit) {
            return true;
        }

        // A selection still loading can be abandoned before its panel opens.
        if self.screen.detail().is_loading() && key_matches_any(&key, &keys.close) {
            self.screen.close_detail();
            return false;
        }

        if key_matches_any(&key, &keys.clear_search) {
            if let Some(ticket) = self.screen.clear_search() {
                self.search_input.reset();
                self.spawn_load(ticket);
            }
            return false;
        }

        if key_matches_any(&key, &keys.select) {
            if let Some((ticket, id)) = self.screen.select_at_cursor() {
                self.spawn_select(ticket, id);
            }
            return false;
        }

        if key_matches_any(&key, &keys.next) {
            self.screen.move_cursor(1);
            return false;
        }
        if key_matches_any(&key, &keys.prev) {
            self.screen.move_cursor(-1);
            return false;
        }
        if key_matches_any(&key, &keys.page_down) {
            self.screen.move_cursor(PAGE);
            return false;
        }
        if key_matches_any(&key, &keys.page_up) {
            self.screen.move_cursor(-PAGE);
            return false;
        }

        if let Some(change) = self.search_input.handle_event(&Event::Key(key)) {
            if change.value {
                let ticket = self.screen.set_search_term(self.search_input.value());
                self.spawn_load(ticket);
            }
        }
        false
    }

    pub fn ui_colors(&self) -> &UiColors {
        &self.config.ui.colors
    }

    pub fn image_pane_width(&self) -> u16 {
        self.config.ui.pane.image.width
    }

    pub fn image_pane_height(&self) -> u16 {
        self.config.ui.pane.image.height
    }

    pub fn profile_image_state(&mut self) -> Option<&mut Box<dyn StatefulProtocol>> {
        self.image_state.as_mut()
    }

    pub fn photo_error(&self) -> Option<&str> {
        self.photo_error.as_deref()
    }

    pub fn keys_hint(&self) -> String {
        let keys = &self.config.keys;
        if self.screen.notice().is_some() {
            format!("{}: dismiss", keys.dismiss.join("/"))
        } else if self.screen.detail().is_panel_visible() {
            format!("{}: close  {}: quit", keys.close.join("/"), keys.quit.join("/"))
        } else {
            format!(
                "Type to filter  {}: open  {}: clear  {}: quit",
                keys.select.join("/"),
                keys.clear_search.join("/"),
                keys.quit.join("/")
            )
        }
    }
}

/// Check if the key event matches any of the given bindings
pub fn key_matches_any(event: &KeyEvent, bindings: &[String]) -> bool {
    bindings.iter().any(|b| key_matches_single(event, b))
}

/// Check if the key event matches a single binding string
fn key_matches_single(event: &KeyEvent, binding: &str) -> bool {
    let trimmed = binding.trim();
    if trimmed.is_empty() {
        return false;
    }

    // Disallow Ctrl/Alt/Super modifiers (we don't support them)
    let disallowed = KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER;
    if event.modifiers.intersects(disallowed) {
        return false;
    }

    match trimmed.to_ascii_lowercase().as_str() {
        "enter" => matches!(event.code, KeyCode::Enter),
        "tab" => matches!(event.code, KeyCode::Tab),
        "backtab" | "shift+tab" => matches!(event.code, KeyCode::BackTab),
        "backspace" => matches!(event.code, KeyCode::Backspace),
        "esc" | "escape" => matches!(event.code, KeyCode::Esc),
        "space" => matches!(event.code, KeyCode::Char(' ')),
        "up" => matches!(event.code, KeyCode::Up),
        "down" => matches!(event.code, KeyCode::Down),
        "left" => matches!(event.code, KeyCode::Left),
        "right" => matches!(event.code, KeyCode::Right),
        "pageup" | "page_up" => matches!(event.code, KeyCode::PageUp),
        "pagedown" | "page_down" => matches!(event.code, KeyCode::PageDown),
        "home" => matches!(event.code, KeyCode::Home),
        "end" => matches!(event.code, KeyCode::End),
        name if name.starts_with('f') && name.len() > 1 => match name[1..].parse::<u8>() {
            Ok(n) if (1..=12).contains(&n) => matches!(event.code, KeyCode::F(f) if f == n),
            _ => false,
        },
        // Single character - case-sensitive (m != M, since M requires Shift)
        _ => {
            let mut chars = trimmed.chars();
            if let (Some(first), None) = (chars.next(), chars.next()) {
                matches!(event.code, KeyCode::Char(c) if c == first)
            } else {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tokio::task::LocalSet;

    use super::*;
    use crate::config::{Keys, UiConfig};
    use crate::source::testing::{contact, ScriptedSource};
    use crate::source::Authorization;

    fn config() -> Config {
        Config {
            config_path: PathBuf::from("config.toml"),
            vdir: PathBuf::from("/contacts"),
            phone_region: None,
            source_timeout: Duration::from_secs(5),
            keys: Keys::default(),
            ui: UiConfig::default(),
        }
    }

    fn source() -> Rc<ScriptedSource> {
        Rc::new(ScriptedSource::new(vec![
            contact("1", "Ana"),
            contact("2", "Anderson"),
            contact("3", "Bruno"),
        ]))
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text<S: ContactSource + 'static>(app: &mut App<'_, S>, text: &str) {
        for c in text.chars() {
            assert!(!app.handle_key(press(KeyCode::Char(c))));
        }
    }

    fn shown_ids<S>(app: &App<'_, S>) -> Vec<String> {
        app.screen
            .groups()
            .iter()
            .flat_map(|g| g.items.iter().map(|i| i.id.clone()))
            .collect()
    }

    #[test]
    fn test_key_matching() {
        assert!(key_matches_single(&press(KeyCode::F(10)), "F10"));
        assert!(!key_matches_single(&press(KeyCode::F(1)), "F10"));
        assert!(key_matches_single(&press(KeyCode::Esc), "Escape"));
        assert!(key_matches_single(&press(KeyCode::PageDown), "pagedown"));
        assert!(key_matches_single(&press(KeyCode::Char('M')), "M"));
        assert!(!key_matches_single(&press(KeyCode::Char('m')), "M"));
        assert!(!key_matches_single(
            &KeyEvent::new(KeyCode::Char('q'), KeyModifiers::CONTROL),
            "q"
        ));
        assert!(!key_matches_single(&press(KeyCode::Enter), "  "));
        assert!(key_matches_any(
            &press(KeyCode::Enter),
            &["Escape".to_string(), "Enter".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_typing_filters_and_only_latest_term_applies() {
        let config = config();
        let source = source();
        LocalSet::new()
            .run_until(async {
                let mut app = App::new(Rc::clone(&source), &config, Picker::new(DEFAULT_FONT_SIZE));
                app.start();
                app.settle().await;
                assert_eq!(shown_ids(&app), vec!["1", "2", "3"]);

                type_text(&mut app, "and");
                app.settle().await;

                assert_eq!(app.screen.search_term(), "and");
                assert_eq!(shown_ids(&app), vec!["2"]);
                assert_eq!(*source.query_calls.borrow(), vec!["", "a", "an", "and"]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_escape_clears_search() {
        let config = config();
        let source = source();
        LocalSet::new()
            .run_until(async {
                let mut app = App::new(Rc::clone(&source), &config, Picker::new(DEFAULT_FONT_SIZE));
                app.start();
                type_text(&mut app, "bru");
                app.settle().await;
                assert_eq!(shown_ids(&app), vec!["3"]);

                app.handle_key(press(KeyCode::Esc));
                app.settle().await;
                assert_eq!(app.search_input.value(), "");
                assert_eq!(shown_ids(&app), vec!["1", "2", "3"]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_enter_opens_panel_and_escape_closes_it() {
        let config = config();
        let source = source();
        source.set_phones("2", &["+5511912345678"]);
        LocalSet::new()
            .run_until(async {
                let mut app = App::new(Rc::clone(&source), &config, Picker::new(DEFAULT_FONT_SIZE));
                app.start();
                app.settle().await;

                app.handle_key(press(KeyCode::Down));
                app.handle_key(press(KeyCode::Enter));
                app.settle().await;
                assert!(app.screen.detail().is_panel_visible());
                let detail = app.screen.detail().detail().unwrap();
                assert_eq!(detail.id, "2");
                assert_eq!(detail.phone_numbers.len(), 1);

                // Typing does not reach the search box while the panel is open.
                app.handle_key(press(KeyCode::Char('x')));
                assert_eq!(app.search_input.value(), "");

                app.handle_key(press(KeyCode::Esc));
                assert!(!app.screen.detail().is_panel_visible());

                app.handle_key(press(KeyCode::Enter));
                app.settle().await;
                assert_eq!(*source.detail_calls.borrow(), vec!["2", "2"]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_escape_abandons_pending_selection() {
        let config = config();
        let source = source();
        LocalSet::new()
            .run_until(async {
                let mut app = App::new(Rc::clone(&source), &config, Picker::new(DEFAULT_FONT_SIZE));
                app.start();
                app.settle().await;

                app.handle_key(press(KeyCode::Enter));
                assert!(app.screen.detail().is_loading());
                app.handle_key(press(KeyCode::Esc));
                app.settle().await;
                assert!(!app.screen.detail().is_panel_visible());
            })
            .await;
    }

    #[tokio::test]
    async fn test_denied_access_shows_notice_until_dismissed() {
        let config = config();
        let source = source();
        source.set_authorization(Authorization::Denied);
        LocalSet::new()
            .run_until(async {
                let mut app = App::new(Rc::clone(&source), &config, Picker::new(DEFAULT_FONT_SIZE));
                app.start();
                app.settle().await;

                assert!(app.screen.groups().is_empty());
                assert!(app.screen.notice().is_some());

                app.handle_key(press(KeyCode::Char('a')));
                assert_eq!(app.search_input.value(), "");

                app.handle_key(press(KeyCode::Enter));
                assert!(app.screen.notice().is_none());
            })
            .await;
    }

    #[tokio::test]
    async fn test_quit_keys() {
        let config = config();
        let source = source();
        LocalSet::new()
            .run_until(async {
                let mut app = App::new(Rc::clone(&source), &config, Picker::new(DEFAULT_FONT_SIZE));
                assert!(app.handle_key(press(KeyCode::F(10))));
                assert!(app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
                assert!(!app.handle_key(press(KeyCode::Char('q'))));
            })
            .await;
    }
}
