use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use termdoc_core::Command;

const SCALE_STEP: f32 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(Command),
    OpenPrompt(PromptKind),
    PromptChanged { input: String },
    PromptSubmit { kind: PromptKind, input: String },
    PromptCancel,
    ShowHelp,
    ShowDebug,
    CloseOverlay,
    /// Re-measure the terminal and repaint.
    Refresh,
    Resize,
    Quit,
    /// Leave the viewer and let the caller pick another file.
    Back,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Search,
    GotoPage,
}

impl PromptKind {
    fn prefix(self) -> &'static str {
        match self {
            PromptKind::Search => "/",
            PromptKind::GotoPage => "Go to page: ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Prompt(PromptKind),
    Help,
    Debug,
}

impl InputMode {
    pub fn is_overlay(self) -> bool {
        matches!(self, InputMode::Help | InputMode::Debug)
    }
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    prompt_buffer: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.prompt_buffer.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => {
                if is_interrupt(&key) {
                    self.reset_count();
                    return UiEvent::Quit;
                }
                match self.mode {
                    InputMode::Normal => self.map_key_normal(key),
                    InputMode::Prompt(kind) => self.map_key_prompt(kind, key),
                    InputMode::Help | InputMode::Debug => {
                        self.set_mode(InputMode::Normal);
                        UiEvent::CloseOverlay
                    }
                }
            }
            Event::Resize(_, _) => UiEvent::Resize,
            _ => UiEvent::None,
        }
    }

    fn map_key_normal(&mut self, KeyEvent { code, modifiers, .. }: KeyEvent) -> UiEvent {
        let shifted = modifiers.contains(KeyModifiers::SHIFT);
        match code {
            KeyCode::Char(c) if c.is_ascii_digit() && !modifiers.contains(KeyModifiers::CONTROL) => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            KeyCode::Down | KeyCode::Right if shifted => self.next(2),
            KeyCode::Up | KeyCode::Left if shifted => self.prev(2),
            KeyCode::Char('j') | KeyCode::Char(' ') | KeyCode::Down | KeyCode::Right => self.next(1),
            KeyCode::Char('k') | KeyCode::Up | KeyCode::Left => self.prev(1),
            KeyCode::Char('J') => self.next(2),
            KeyCode::Char('K') => self.prev(2),
            KeyCode::Char('g') => match self.pending_count.take() {
                Some(number) => {
                    self.reset_count();
                    UiEvent::Command(Command::GotoPage { number })
                }
                None => self.open_prompt(PromptKind::GotoPage),
            },
            KeyCode::Char('G') | KeyCode::End => self.command(Command::LastPage),
            KeyCode::Home => self.command(Command::FirstPage),
            KeyCode::Char('/') => self.open_prompt(PromptKind::Search),
            KeyCode::Char('n') => {
                let count = self.take_count();
                UiEvent::Command(Command::SearchNext { count })
            }
            KeyCode::Char('N') => {
                let count = self.take_count();
                UiEvent::Command(Command::SearchPrev { count })
            }
            KeyCode::Char('t') => self.command(Command::CycleForceMode),
            KeyCode::Char('f') => self.command(Command::CycleFitMode),
            KeyCode::Char('+') | KeyCode::Char('=') => self.command(Command::ScaleBy { delta: SCALE_STEP }),
            KeyCode::Char('-') | KeyCode::Char('_') => self.command(Command::ScaleBy { delta: -SCALE_STEP }),
            KeyCode::Char('i') => self.command(Command::CycleDarkMode),
            KeyCode::Char('D') => self.command(Command::CycleDualPage),
            KeyCode::Esc => self.command(Command::ClearSearch),
            KeyCode::Char('r') => {
                self.reset_count();
                UiEvent::Refresh
            }
            KeyCode::Char('d') => {
                self.set_mode(InputMode::Debug);
                UiEvent::ShowDebug
            }
            KeyCode::Char('h') | KeyCode::Char('?') => {
                self.set_mode(InputMode::Help);
                UiEvent::ShowHelp
            }
            KeyCode::Char('q') => {
                self.reset_count();
                UiEvent::Quit
            }
            KeyCode::Char('b') => {
                self.reset_count();
                UiEvent::Back
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_key_prompt(&mut self, kind: PromptKind, KeyEvent { code, modifiers, .. }: KeyEvent) -> UiEvent {
        match code {
            KeyCode::Esc => {
                self.set_mode(InputMode::Normal);
                UiEvent::PromptCancel
            }
            KeyCode::Enter => {
                let input = std::mem::take(&mut self.prompt_buffer);
                self.set_mode(InputMode::Normal);
                UiEvent::PromptSubmit { kind, input }
            }
            KeyCode::Backspace => {
                self.prompt_buffer.pop();
                UiEvent::PromptChanged {
                    input: self.prompt_buffer.clone(),
                }
            }
            KeyCode::Char(c) if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT => {
                self.prompt_buffer.push(c);
                UiEvent::PromptChanged {
                    input: self.prompt_buffer.clone(),
                }
            }
            _ => UiEvent::None,
        }
    }

    fn next(&mut self, step: usize) -> UiEvent {
        let count = self.take_count().saturating_mul(step);
        UiEvent::Command(Command::NextPage { count })
    }

    fn prev(&mut self, step: usize) -> UiEvent {
        let count = self.take_count().saturating_mul(step);
        UiEvent::Command(Command::PrevPage { count })
    }

    fn command(&mut self, command: Command) -> UiEvent {
        self.reset_count();
        UiEvent::Command(command)
    }

    fn open_prompt(&mut self, kind: PromptKind) -> UiEvent {
        self.set_mode(InputMode::Prompt(kind));
        UiEvent::OpenPrompt(kind)
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    /// Text to show in the status line while the user is typing.
    pub fn pending_input(&self) -> Option<String> {
        if let InputMode::Prompt(kind) = self.mode {
            return Some(format!("{}{}", kind.prefix(), self.prompt_buffer));
        }
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

fn is_interrupt(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn press(code: KeyCode) -> Event {
        press_with(code, KeyModifiers::NONE)
    }

    fn press_with(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn type_text(mapper: &mut EventMapper, text: &str) {
        for c in text.chars() {
            mapper.map_event(press(KeyCode::Char(c)));
        }
    }

    #[test]
    fn count_prefix_applies_to_one_command() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(press(KeyCode::Char('1'))), UiEvent::None);
        assert_eq!(mapper.map_event(press(KeyCode::Char('2'))), UiEvent::None);
        assert_eq!(
            mapper.map_event(press(KeyCode::Char('j'))),
            UiEvent::Command(Command::NextPage { count: 12 })
        );
        assert_eq!(
            mapper.map_event(press(KeyCode::Up)),
            UiEvent::Command(Command::PrevPage { count: 1 })
        );

        // a cycle key swallows the prefix
        mapper.map_event(press(KeyCode::Char('4')));
        assert_eq!(
            mapper.map_event(press(KeyCode::Char('f'))),
            UiEvent::Command(Command::CycleFitMode)
        );
        assert_eq!(
            mapper.map_event(press(KeyCode::Char(' '))),
            UiEvent::Command(Command::NextPage { count: 1 })
        );
    }

    #[test]
    fn double_steps_multiply_the_prefix() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(press_with(KeyCode::Char('J'), KeyModifiers::SHIFT)),
            UiEvent::Command(Command::NextPage { count: 2 })
        );
        mapper.map_event(press(KeyCode::Char('3')));
        assert_eq!(
            mapper.map_event(press(KeyCode::Char('K'))),
            UiEvent::Command(Command::PrevPage { count: 6 })
        );
        assert_eq!(
            mapper.map_event(press_with(KeyCode::Right, KeyModifiers::SHIFT)),
            UiEvent::Command(Command::NextPage { count: 2 })
        );
        assert_eq!(
            mapper.map_event(press(KeyCode::Left)),
            UiEvent::Command(Command::PrevPage { count: 1 })
        );
    }

    #[test]
    fn numeric_prefix_before_g_jumps_directly() {
        let mut mapper = EventMapper::new();
        type_text(&mut mapper, "42");
        assert_eq!(
            mapper.map_event(press(KeyCode::Char('g'))),
            UiEvent::Command(Command::GotoPage { number: 42 })
        );
        assert!(mapper.pending_input().is_none());
        assert_eq!(mapper.mode(), InputMode::Normal);
    }

    #[test]
    fn bare_g_opens_page_prompt() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(press(KeyCode::Char('g'))),
            UiEvent::OpenPrompt(PromptKind::GotoPage)
        );
        type_text(&mut mapper, "17");
        assert_eq!(mapper.pending_input().as_deref(), Some("Go to page: 17"));
        assert_eq!(
            mapper.map_event(press(KeyCode::Enter)),
            UiEvent::PromptSubmit {
                kind: PromptKind::GotoPage,
                input: "17".to_string()
            }
        );
        assert_eq!(mapper.mode(), InputMode::Normal);
    }

    #[test]
    fn event_mapper_slash_enters_search_mode_and_collects_input() {
        let mut mapper = EventMapper::new();

        assert_eq!(
            mapper.map_event(press(KeyCode::Char('/'))),
            UiEvent::OpenPrompt(PromptKind::Search)
        );
        assert_eq!(mapper.pending_input().as_deref(), Some("/"));

        match mapper.map_event(press(KeyCode::Char('f'))) {
            UiEvent::PromptChanged { ref input } => assert_eq!(input, "f"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(mapper.pending_input().as_deref(), Some("/f"));

        match mapper.map_event(press(KeyCode::Backspace)) {
            UiEvent::PromptChanged { ref input } => assert!(input.is_empty()),
            other => panic!("unexpected event: {:?}", other),
        }

        // commands are plain text while typing
        type_text(&mut mapper, "q j");
        match mapper.map_event(press(KeyCode::Enter)) {
            UiEvent::PromptSubmit { kind, ref input } => {
                assert_eq!(kind, PromptKind::Search);
                assert_eq!(input, "q j");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn escape_cancels_prompt_and_discards_input() {
        let mut mapper = EventMapper::new();
        mapper.map_event(press(KeyCode::Char('/')));
        type_text(&mut mapper, "abc");
        assert_eq!(mapper.map_event(press(KeyCode::Esc)), UiEvent::PromptCancel);
        assert_eq!(mapper.mode(), InputMode::Normal);

        mapper.map_event(press(KeyCode::Char('/')));
        assert_eq!(mapper.pending_input().as_deref(), Some("/"));
    }

    #[test]
    fn search_navigation_takes_counts() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(press(KeyCode::Char('n'))),
            UiEvent::Command(Command::SearchNext { count: 1 })
        );
        mapper.map_event(press(KeyCode::Char('3')));
        assert_eq!(
            mapper.map_event(press_with(KeyCode::Char('N'), KeyModifiers::SHIFT)),
            UiEvent::Command(Command::SearchPrev { count: 3 })
        );
    }

    #[test]
    fn mode_keys_map_to_cycles() {
        let mut mapper = EventMapper::new();
        let cases = [
            (KeyCode::Char('t'), Command::CycleForceMode),
            (KeyCode::Char('f'), Command::CycleFitMode),
            (KeyCode::Char('i'), Command::CycleDarkMode),
            (KeyCode::Char('D'), Command::CycleDualPage),
            (KeyCode::Char('G'), Command::LastPage),
            (KeyCode::End, Command::LastPage),
            (KeyCode::Home, Command::FirstPage),
            (KeyCode::Char('+'), Command::ScaleBy { delta: 0.1 }),
            (KeyCode::Char('='), Command::ScaleBy { delta: 0.1 }),
            (KeyCode::Char('-'), Command::ScaleBy { delta: -0.1 }),
            (KeyCode::Char('_'), Command::ScaleBy { delta: -0.1 }),
        ];
        for (code, command) in cases {
            assert_eq!(mapper.map_event(press(code)), UiEvent::Command(command));
        }
    }

    #[test]
    fn overlays_close_on_any_key() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(press(KeyCode::Char('?'))), UiEvent::ShowHelp);
        assert_eq!(mapper.mode(), InputMode::Help);
        assert!(mapper.mode().is_overlay());
        assert_eq!(mapper.map_event(press(KeyCode::Char('j'))), UiEvent::CloseOverlay);
        assert_eq!(mapper.mode(), InputMode::Normal);

        assert_eq!(mapper.map_event(press(KeyCode::Char('d'))), UiEvent::ShowDebug);
        assert_eq!(mapper.map_event(press(KeyCode::Char('q'))), UiEvent::CloseOverlay);
    }

    #[test]
    fn quit_back_and_interrupt() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(press(KeyCode::Char('q'))), UiEvent::Quit);
        assert_eq!(mapper.map_event(press(KeyCode::Char('b'))), UiEvent::Back);
        assert_eq!(mapper.map_event(press(KeyCode::Char('r'))), UiEvent::Refresh);

        mapper.map_event(press(KeyCode::Char('/')));
        assert_eq!(
            mapper.map_event(press_with(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            UiEvent::Quit
        );
    }

    #[test]
    fn release_events_are_ignored() {
        let mut mapper = EventMapper::new();
        let release = Event::Key(KeyEvent {
            code: KeyCode::Char('j'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        });
        assert_eq!(mapper.map_event(release), UiEvent::None);
        assert_eq!(mapper.map_event(Event::Resize(100, 40)), UiEvent::Resize);
    }

    #[test]
    fn pending_input_shows_digits_until_consumed() {
        let mut mapper = EventMapper::new();
        assert!(mapper.pending_input().is_none());
        type_text(&mut mapper, "12");
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));
        mapper.map_event(press(KeyCode::Char('j')));
        assert!(mapper.pending_input().is_none());
    }
}
