use crate::form::FormState;
use crate::model::{HistoryEntry, HistoryRow, OutputFormat, Resolution, UiEvent};
use crate::orchestrator::UiCommand;
use crate::view::{PreviewPanel, ViewState};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

pub const TAB_RENDER: usize = 0;
pub const TAB_HISTORY: usize = 1;
pub const TAB_HELP: usize = 2;
pub const TAB_TITLES: [&str; 3] = ["Render", "History", "Help"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    RepoPath,
    Branch,
    Format,
    Resolution,
    Width,
    Height,
    Fps,
    BgColor,
    TextColor,
    FontSize,
    NoEmail,
}

impl Field {
    const ALL: [Field; 11] = [
        Field::RepoPath,
        Field::Branch,
        Field::Format,
        Field::Resolution,
        Field::Width,
        Field::Height,
        Field::Fps,
        Field::BgColor,
        Field::TextColor,
        Field::FontSize,
        Field::NoEmail,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Field::RepoPath => "Repository",
            Field::Branch => "Branch",
            Field::Format => "Format",
            Field::Resolution => "Resolution",
            Field::Width => "Width",
            Field::Height => "Height",
            Field::Fps => "FPS",
            Field::BgColor => "Background",
            Field::TextColor => "Text color",
            Field::FontSize => "Font size",
            Field::NoEmail => "Hide emails",
        }
    }

    /// Choice fields cycle with Left/Right/Space; the rest take typed text.
    pub fn is_choice(self) -> bool {
        matches!(
            self,
            Field::Branch | Field::Format | Field::Resolution | Field::NoEmail
        )
    }
}

/// What the UI loop should do after a key press.
#[derive(Debug)]
pub enum KeyOutcome {
    Nothing,
    Command(UiCommand),
    Quit,
}

/// UI-thread state: the editable form, focus and selection, plus the shared view.
pub struct UiState {
    pub tab: usize,
    pub form: FormState,
    focus: usize,
    pub history_selected: usize,
    pub view: ViewState,
}

impl UiState {
    pub fn new(form: FormState) -> Self {
        Self {
            tab: TAB_RENDER,
            form,
            focus: 0,
            history_selected: 0,
            view: ViewState::default(),
        }
    }

    pub fn apply_event(&mut self, ev: UiEvent) {
        let branches_changed = matches!(ev, UiEvent::BranchesLoaded(_));
        self.view.apply_event(ev);
        if branches_changed && self.view.branches.position_of(&self.form.branch).is_none() {
            self.form.branch.clear();
        }
        let count = self.history_entries().len();
        if self.history_selected >= count {
            self.history_selected = count.saturating_sub(1);
        }
    }

    /// Fields shown for the current resolution; width/height only in custom mode.
    pub fn visible_fields(&self) -> Vec<Field> {
        let custom = self.form.resolution.is_custom();
        Field::ALL
            .into_iter()
            .filter(|f| custom || !matches!(f, Field::Width | Field::Height))
            .collect()
    }

    pub fn focused(&self) -> Field {
        let fields = self.visible_fields();
        fields[self.focus.min(fields.len() - 1)]
    }

    pub fn field_value(&self, field: Field) -> String {
        let f = &self.form;
        match field {
            Field::RepoPath => f.repo_path.clone(),
            Field::Branch => {
                if f.branch.is_empty() {
                    crate::model::BranchList::SENTINEL_LABEL.to_string()
                } else {
                    f.branch.clone()
                }
            }
            Field::Format => f.format.to_string(),
            Field::Resolution => f.resolution.to_string(),
            Field::Width => f.width.clone(),
            Field::Height => f.height.clone(),
            Field::Fps => f.fps.clone(),
            Field::BgColor => f.bg_color.clone(),
            Field::TextColor => f.text_color.clone(),
            Field::FontSize => f.font_size.clone(),
            Field::NoEmail => (if f.no_email { "yes" } else { "no" }).to_string(),
        }
    }

    fn text_mut(&mut self, field: Field) -> Option<&mut String> {
        let f = &mut self.form;
        match field {
            Field::RepoPath => Some(&mut f.repo_path),
            Field::Width => Some(&mut f.width),
            Field::Height => Some(&mut f.height),
            Field::Fps => Some(&mut f.fps),
            Field::BgColor => Some(&mut f.bg_color),
            Field::TextColor => Some(&mut f.text_color),
            Field::FontSize => Some(&mut f.font_size),
            _ => None,
        }
    }

    fn move_focus(&mut self, forward: bool) {
        let len = self.visible_fields().len();
        let current = self.focus.min(len - 1);
        self.focus = if forward {
            (current + 1) % len
        } else {
            (current + len - 1) % len
        };
    }

    fn cycle(&mut self, forward: bool) {
        fn step<T: Copy + PartialEq>(all: &[T], cur: T, forward: bool) -> T {
            let i = all.iter().position(|v| *v == cur).unwrap_or(0);
            let n = all.len();
            all[if forward { (i + 1) % n } else { (i + n - 1) % n }]
        }

        match self.focused() {
            Field::Branch => {
                let options = self.view.branches.options();
                let i = self.view.branches.position_of(&self.form.branch).unwrap_or(0);
                let n = options.len();
                let next = if forward { (i + 1) % n } else { (i + n - 1) % n };
                self.form.branch = options[next].value.clone().unwrap_or_default();
            }
            Field::Format => {
                self.form.format = step(&OutputFormat::ALL, self.form.format, forward);
            }
            Field::Resolution => {
                self.form.resolution = step(&Resolution::ALL, self.form.resolution, forward);
                let len = self.visible_fields().len();
                self.focus = self.focus.min(len - 1);
            }
            Field::NoEmail => self.form.no_email = !self.form.no_email,
            _ => {}
        }
    }

    pub fn history_entries(&self) -> Vec<&HistoryEntry> {
        self.view
            .history
            .iter()
            .flatten()
            .filter_map(|row| match row {
                HistoryRow::Entry(e) => Some(e),
                HistoryRow::Placeholder => None,
            })
            .collect()
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> KeyOutcome {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && key.code == KeyCode::Char('c') {
            return KeyOutcome::Quit;
        }

        if self.view.current_alert().is_some() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                self.view.dismiss_alert();
            }
            return KeyOutcome::Nothing;
        }

        match key.code {
            KeyCode::Esc => return KeyOutcome::Quit,
            KeyCode::Tab => {
                self.tab = (self.tab + 1) % TAB_TITLES.len();
                return KeyOutcome::Nothing;
            }
            KeyCode::BackTab => {
                self.tab = (self.tab + TAB_TITLES.len() - 1) % TAB_TITLES.len();
                return KeyOutcome::Nothing;
            }
            _ => {}
        }

        match self.tab {
            TAB_RENDER => self.render_key(key, ctrl),
            TAB_HISTORY => self.history_key(key),
            _ => match key.code {
                KeyCode::Char('q') => KeyOutcome::Quit,
                _ => KeyOutcome::Nothing,
            },
        }
    }

    fn render_key(&mut self, key: KeyEvent, ctrl: bool) -> KeyOutcome {
        if ctrl {
            return match key.code {
                KeyCode::Char('b') => {
                    if self.view.branch_control.is_ready() {
                        KeyOutcome::Command(UiCommand::LoadBranches(self.form.repo_path.clone()))
                    } else {
                        KeyOutcome::Nothing
                    }
                }
                KeyCode::Char('p') => {
                    if self.view.preview == PreviewPanel::Loading {
                        KeyOutcome::Nothing
                    } else {
                        KeyOutcome::Command(UiCommand::Preview(self.form.clone()))
                    }
                }
                KeyCode::Char('d') => {
                    if self.view.download_visible {
                        KeyOutcome::Command(UiCommand::DownloadActive)
                    } else {
                        self.view.info = Some("Nothing to download yet.".into());
                        KeyOutcome::Nothing
                    }
                }
                KeyCode::Char('r') => KeyOutcome::Command(UiCommand::RefreshHistory),
                _ => KeyOutcome::Nothing,
            };
        }

        let field = self.focused();
        match key.code {
            KeyCode::Up => self.move_focus(false),
            KeyCode::Down => self.move_focus(true),
            KeyCode::Left if field.is_choice() => self.cycle(false),
            KeyCode::Right if field.is_choice() => self.cycle(true),
            KeyCode::Char(' ') if field.is_choice() => self.cycle(true),
            KeyCode::Enter => {
                if self.view.submit.is_ready() {
                    return KeyOutcome::Command(UiCommand::Submit(self.form.clone()));
                }
                self.view.info = Some("A job is already in progress.".into());
            }
            KeyCode::Backspace => {
                if let Some(text) = self.text_mut(field) {
                    text.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(text) = self.text_mut(field) {
                    text.push(c);
                }
            }
            _ => {}
        }
        KeyOutcome::Nothing
    }

    fn history_key(&mut self, key: KeyEvent) -> KeyOutcome {
        let count = self.history_entries().len();
        match key.code {
            KeyCode::Char('q') => return KeyOutcome::Quit,
            KeyCode::Up | KeyCode::Char('k') => {
                self.history_selected = self.history_selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.history_selected + 1 < count {
                    self.history_selected += 1;
                }
            }
            KeyCode::Char('r') => return KeyOutcome::Command(UiCommand::RefreshHistory),
            KeyCode::Char('d') => {
                let selected = self.history_entries().get(self.history_selected).copied().cloned();
                match selected {
                    Some(e) if e.downloadable => {
                        return KeyOutcome::Command(UiCommand::DownloadJob {
                            job_id: e.job_id,
                            format: e.format,
                        });
                    }
                    Some(_) => self.view.info = Some("That job has no output.".into()),
                    None => {}
                }
            }
            _ => {}
        }
        KeyOutcome::Nothing
    }
}
