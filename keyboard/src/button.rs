//! Behaviours of the non-character toolbar buttons.
//!
//! A closed set of tag-dispatched behaviours keyed by button id. Press,
//! release and update return actions as values; the keyboard view
//! executes them against the components it owns.

/// Ids of the recognized toolbar buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonId {
    Move,
    ShowClick,
    Hide,
    Settings,
    Quit,
    NextLayer,
    WordListPrevious,
    WordListNext,
    LanguageSelect,
}

impl ButtonId {
    pub fn from_key_id(id: &str) -> Option<ButtonId> {
        Some(match id {
            "move" => ButtonId::Move,
            "showclick" => ButtonId::ShowClick,
            "hide" => ButtonId::Hide,
            "settings" => ButtonId::Settings,
            "quit" => ButtonId::Quit,
            "layer.next" => ButtonId::NextLayer,
            "wordlist.previous" => ButtonId::WordListPrevious,
            "wordlist.next" => ButtonId::WordListNext,
            "language" => ButtonId::LanguageSelect,
            _ => return None,
        })
    }
}

/// What the view should do in response to a button event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    None,
    /// Begin moving the keyboard with the next motion event.
    StartMove,
    StopMove,
    HideKeyboard,
    ToggleClickButtons,
    SwitchLayer(usize),
    ScrollWordList(i32),
    ShowLanguageSelection,
    ShowSettings,
    Quit,
}

/// One controller per button id; dispatch is by the id tag.
#[derive(Debug, Clone, Copy)]
pub struct ButtonController {
    id: ButtonId,
}

impl ButtonController {
    pub fn new(id: ButtonId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> ButtonId {
        self.id
    }

    /// May hovering this button trigger a dwell click?
    pub fn can_dwell(&self) -> bool {
        match self.id {
            // move must not activate by accident, settings/quit leave
            // the keyboard
            ButtonId::Move | ButtonId::Settings | ButtonId::Quit => false,
            ButtonId::ShowClick
            | ButtonId::Hide
            | ButtonId::NextLayer
            | ButtonId::WordListPrevious
            | ButtonId::WordListNext
            | ButtonId::LanguageSelect => true,
        }
    }

    pub fn press(&self) -> ButtonAction {
        match self.id {
            ButtonId::Move => ButtonAction::StartMove,
            _ => ButtonAction::None,
        }
    }

    pub fn release(&self) -> ButtonAction {
        match self.id {
            ButtonId::Move => ButtonAction::StopMove,
            ButtonId::Hide => ButtonAction::HideKeyboard,
            ButtonId::ShowClick => ButtonAction::ToggleClickButtons,
            ButtonId::NextLayer => ButtonAction::SwitchLayer(1),
            ButtonId::WordListPrevious => ButtonAction::ScrollWordList(-1),
            ButtonId::WordListNext => ButtonAction::ScrollWordList(1),
            ButtonId::LanguageSelect => ButtonAction::ShowLanguageSelection,
            ButtonId::Settings => ButtonAction::ShowSettings,
            ButtonId::Quit => ButtonAction::Quit,
        }
    }

    pub fn update(&self) -> ButtonAction {
        ButtonAction::None
    }
}
