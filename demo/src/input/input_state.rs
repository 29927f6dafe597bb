// Only the keys the demo scenes respond to. The message loop that would translate platform key
// codes into these is left to the host application.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KeyboardKey {
    W,
    A,
    S,
    D,
    Q,
    E,
    /// Toggles the camera lock
    F,
    Space,
    LShift,
    RShift,
    Escape,
}

impl KeyboardKey {
    const COUNT: usize = 11;

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ButtonState {
    Released,
    Pressed,
}

/// State of input devices for the current frame
pub struct InputState {
    key_is_down: [bool; KeyboardKey::COUNT],
    key_just_down: [bool; KeyboardKey::COUNT],
    key_just_up: [bool; KeyboardKey::COUNT],

    mouse_motion: glam::Vec2,
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

impl InputState {
    pub fn new() -> InputState {
        InputState {
            key_is_down: [false; KeyboardKey::COUNT],
            key_just_down: [false; KeyboardKey::COUNT],
            key_just_up: [false; KeyboardKey::COUNT],
            mouse_motion: glam::Vec2::ZERO,
        }
    }

    /// Returns true if the given key is down
    pub fn is_key_down(
        &self,
        key: KeyboardKey,
    ) -> bool {
        self.key_is_down[key.index()]
    }

    /// Returns true if the key went down during this frame
    pub fn is_key_just_down(
        &self,
        key: KeyboardKey,
    ) -> bool {
        self.key_just_down[key.index()]
    }

    /// Returns true if the key went up during this frame
    pub fn is_key_just_up(
        &self,
        key: KeyboardKey,
    ) -> bool {
        self.key_just_up[key.index()]
    }

    /// Mouse movement accumulated during this frame
    pub fn mouse_motion(&self) -> glam::Vec2 {
        self.mouse_motion
    }

    /// Call when a key event occurs. Repeated presses of a held key are ignored.
    pub fn handle_keyboard_event(
        &mut self,
        key: KeyboardKey,
        button_state: ButtonState,
    ) {
        let index = key.index();
        match button_state {
            ButtonState::Pressed => {
                if !self.key_is_down[index] {
                    self.key_just_down[index] = true;
                }
                self.key_is_down[index] = true;
            }
            ButtonState::Released => {
                if self.key_is_down[index] {
                    self.key_just_up[index] = true;
                }
                self.key_is_down[index] = false;
            }
        }
    }

    /// Call when the mouse moves, deltas are summed until the end of the frame
    pub fn handle_mouse_motion(
        &mut self,
        delta: glam::Vec2,
    ) {
        self.mouse_motion += delta;
    }

    /// Call at the end of every frame. This clears events that were "just" completed.
    pub fn end_frame(&mut self) {
        self.key_just_down = [false; KeyboardKey::COUNT];
        self.key_just_up = [false; KeyboardKey::COUNT];
        self.mouse_motion = glam::Vec2::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_transitions() {
        let mut input_state = InputState::new();
        input_state.handle_keyboard_event(KeyboardKey::W, ButtonState::Pressed);
        assert!(input_state.is_key_down(KeyboardKey::W));
        assert!(input_state.is_key_just_down(KeyboardKey::W));
        assert!(!input_state.is_key_down(KeyboardKey::S));

        input_state.end_frame();
        input_state.handle_keyboard_event(KeyboardKey::W, ButtonState::Pressed);
        assert!(input_state.is_key_down(KeyboardKey::W));
        assert!(!input_state.is_key_just_down(KeyboardKey::W));

        input_state.handle_keyboard_event(KeyboardKey::W, ButtonState::Released);
        assert!(!input_state.is_key_down(KeyboardKey::W));
        assert!(input_state.is_key_just_up(KeyboardKey::W));

        input_state.end_frame();
        assert!(!input_state.is_key_just_up(KeyboardKey::W));
    }

    #[test]
    fn test_mouse_motion_accumulates() {
        let mut input_state = InputState::new();
        input_state.handle_mouse_motion(glam::Vec2::new(1.0, 2.0));
        input_state.handle_mouse_motion(glam::Vec2::new(3.0, -1.0));
        assert_eq!(input_state.mouse_motion(), glam::Vec2::new(4.0, 1.0));

        input_state.end_frame();
        assert_eq!(input_state.mouse_motion(), glam::Vec2::ZERO);
    }

    #[test]
    fn test_key_count_covers_all_keys() {
        assert_eq!(KeyboardKey::Escape.index(), KeyboardKey::COUNT - 1);
    }
}
