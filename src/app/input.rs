use scenedit::materials::TextureSlot;
use winit::keyboard::{KeyCode, PhysicalKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    None,
    Exit,
    ImportModel,
    ReplaceTexture(TextureSlot),
    SelectEnvironment(usize),
    ToggleBackground,
    DeleteSelection,
    /// Left for the selection controller (mode keys).
    Controls(KeyCode),
}

#[derive(Default, Debug, Clone, Copy)]
pub struct InputState {
    pub ctrl: bool,
}

impl InputState {
    pub fn set_ctrl(&mut self, ctrl: bool) {
        self.ctrl = ctrl;
    }

    /// Maps a key press to an editor action. Releases never act.
    pub fn handle_key(&mut self, key: PhysicalKey, pressed: bool) -> InputAction {
        let PhysicalKey::Code(code) = key else {
            return InputAction::None;
        };
        if !pressed {
            return InputAction::None;
        }
        if self.ctrl {
            return match code {
                KeyCode::KeyO => InputAction::ImportModel,
                KeyCode::KeyD => InputAction::ReplaceTexture(TextureSlot::Diffuse),
                KeyCode::KeyN => InputAction::ReplaceTexture(TextureSlot::Normal),
                _ => InputAction::None,
            };
        }
        match code {
            KeyCode::Escape => InputAction::Exit,
            KeyCode::Digit1 => InputAction::SelectEnvironment(0),
            KeyCode::Digit2 => InputAction::SelectEnvironment(1),
            KeyCode::Digit3 => InputAction::SelectEnvironment(2),
            KeyCode::KeyB => InputAction::ToggleBackground,
            KeyCode::Delete | KeyCode::Backspace => InputAction::DeleteSelection,
            other => InputAction::Controls(other),
        }
    }
}
