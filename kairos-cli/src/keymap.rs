//! Key bindings. Which keys are live depends on the state: an open
//! confirmation swallows everything but its answer, and search mode sends
//! printable keys into the buffer.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use kairos_core::app::{Action, AppState};
use kairos_core::confirm::ConfirmPhase;
use kairos_core::query::SearchField;

pub fn map_key(key: KeyEvent, app: &AppState) -> Option<Action> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Action::Quit);
    }

    match app.confirm_phase() {
        ConfirmPhase::AwaitingConfirmation => {
            return match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(Action::Confirm(true)),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    Some(Action::Confirm(false))
                }
                _ => None,
            };
        }
        ConfirmPhase::Executing => return None,
        ConfirmPhase::Idle | ConfirmPhase::Completed => {}
    }

    if app.is_searching() {
        return match key.code {
            KeyCode::Esc => Some(Action::SearchCancel),
            KeyCode::Enter => Some(Action::SearchSubmit),
            KeyCode::Backspace => Some(Action::SearchBackspace),
            KeyCode::Tab => Some(Action::SearchComplete),
            KeyCode::Char(c) => Some(Action::SearchInput(c)),
            _ => None,
        };
    }

    if app.show_help {
        return match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            _ => Some(Action::ToggleHelp),
        };
    }

    let action = match key.code {
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Char('?') => Action::ToggleHelp,
        KeyCode::Char('r') => Action::Refresh,
        KeyCode::Up | KeyCode::Char('k') => Action::CursorUp,
        KeyCode::Down | KeyCode::Char('j') => Action::CursorDown,
        KeyCode::Enter => Action::Enter,
        KeyCode::Esc | KeyCode::Backspace => Action::Back,
        KeyCode::Char('c') => Action::DrillIntoChild,
        KeyCode::Char('o') => Action::OpenInBrowser,
        KeyCode::Char('T') => Action::Terminate,
        KeyCode::Char('R') => Action::Restart,
        // List-only keys
        _ if !app.focus.is_empty() => return None,
        KeyCode::Char(' ') => Action::ToggleSelect,
        KeyCode::Char('n') | KeyCode::Right | KeyCode::PageDown => Action::NextPage,
        KeyCode::Char('p') | KeyCode::Left | KeyCode::PageUp => Action::PrevPage,
        KeyCode::Char('t') => Action::BeginSearch(SearchField::WorkflowType),
        KeyCode::Char('i') => Action::BeginSearch(SearchField::WorkflowId),
        KeyCode::Char('s') => Action::BeginSearch(SearchField::ExecutionStatus),
        KeyCode::Char('x') => Action::ClearFilters,
        KeyCode::Char('P') => Action::ToggleParentsOnly,
        _ => return None,
    };
    Some(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_core::app::{AppEvent, Settings};
    use kairos_core::config::ConnectionProfile;

    fn app() -> AppState {
        AppState::new(ConnectionProfile::local().viewer_links(), Settings::default())
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_normal_mode_bindings() {
        let app = app();
        assert_eq!(map_key(key(KeyCode::Char('j')), &app), Some(Action::CursorDown));
        assert_eq!(map_key(key(KeyCode::Char('T')), &app), Some(Action::Terminate));
        assert_eq!(
            map_key(key(KeyCode::Char('s')), &app),
            Some(Action::BeginSearch(SearchField::ExecutionStatus))
        );
        assert_eq!(map_key(key(KeyCode::Char('z')), &app), None);
    }

    #[test]
    fn test_ctrl_c_quits_everywhere() {
        let mut app = app();
        app.update(AppEvent::Input(Action::BeginSearch(SearchField::WorkflowId)));
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(map_key(ctrl_c, &app), Some(Action::Quit));
    }

    #[test]
    fn test_search_mode_captures_letters() {
        let mut app = app();
        app.update(AppEvent::Input(Action::BeginSearch(SearchField::WorkflowType)));
        assert!(app.is_searching());
        assert_eq!(
            map_key(key(KeyCode::Char('q')), &app),
            Some(Action::SearchInput('q'))
        );
        assert_eq!(map_key(key(KeyCode::Tab), &app), Some(Action::SearchComplete));
        assert_eq!(map_key(key(KeyCode::Esc), &app), Some(Action::SearchCancel));

        app.update(AppEvent::Input(Action::SearchCancel));
        assert!(!app.is_searching());
        assert_eq!(map_key(key(KeyCode::Char('q')), &app), Some(Action::Quit));
    }

    #[test]
    fn test_help_closes_on_any_key() {
        let mut app = app();
        app.show_help = true;
        assert_eq!(map_key(key(KeyCode::Char('j')), &app), Some(Action::ToggleHelp));
        assert_eq!(map_key(key(KeyCode::Char('q')), &app), Some(Action::Quit));
    }
}
