use super::{ButtonState, InputState, KeyboardKey};

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ScriptedAction {
    /// Key is pressed on the first frame of the step and released after the last
    HoldKey(KeyboardKey),
    /// Mouse moves by this much on every frame of the step
    MouseMotion(glam::Vec2),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScriptedStep {
    pub first_frame: u32,
    pub frame_count: u32,
    pub action: ScriptedAction,
}

impl ScriptedStep {
    pub fn hold_key(
        key: KeyboardKey,
        first_frame: u32,
        frame_count: u32,
    ) -> Self {
        ScriptedStep {
            first_frame,
            frame_count,
            action: ScriptedAction::HoldKey(key),
        }
    }

    pub fn mouse_motion(
        delta: glam::Vec2,
        first_frame: u32,
        frame_count: u32,
    ) -> Self {
        ScriptedStep {
            first_frame,
            frame_count,
            action: ScriptedAction::MouseMotion(delta),
        }
    }

    fn end_frame(&self) -> u32 {
        self.first_frame + self.frame_count
    }
}

/// Feeds a fixed sequence of key holds and mouse motion into an `InputState`, standing in for a
/// window's message loop. The sequence repeats every `period` frames.
#[derive(Clone, Debug)]
pub struct ScriptedInput {
    steps: Vec<ScriptedStep>,
    period: u32,
}

impl ScriptedInput {
    pub fn new(
        steps: Vec<ScriptedStep>,
        period: u32,
    ) -> Self {
        let period = steps
            .iter()
            .map(|step| step.end_frame() + 1)
            .max()
            .unwrap_or(1)
            .max(period);

        ScriptedInput { steps, period }
    }

    /// No input at all
    pub fn idle() -> Self {
        Self::new(Vec::default(), 1)
    }

    /// Walks forward while looking around, strafes, sprints, then locks the view for a while
    pub fn fly_around() -> Self {
        Self::new(
            vec![
                ScriptedStep::hold_key(KeyboardKey::W, 0, 90),
                ScriptedStep::mouse_motion(glam::Vec2::new(4.0, 0.0), 30, 30),
                ScriptedStep::hold_key(KeyboardKey::LShift, 60, 30),
                ScriptedStep::hold_key(KeyboardKey::D, 100, 40),
                ScriptedStep::mouse_motion(glam::Vec2::new(-4.0, 1.0), 100, 40),
                ScriptedStep::hold_key(KeyboardKey::F, 150, 1),
                ScriptedStep::hold_key(KeyboardKey::S, 160, 60),
                ScriptedStep::hold_key(KeyboardKey::F, 230, 1),
                ScriptedStep::hold_key(KeyboardKey::S, 240, 40),
                ScriptedStep::mouse_motion(glam::Vec2::new(0.0, -1.0), 240, 40),
            ],
            300,
        )
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    /// Applies the events of the given frame. Call once per frame before the scene updates.
    pub fn update(
        &self,
        frame_index: u64,
        input_state: &mut InputState,
    ) {
        let frame = (frame_index % self.period as u64) as u32;
        for step in &self.steps {
            match step.action {
                ScriptedAction::HoldKey(key) => {
                    if frame == step.first_frame {
                        input_state.handle_keyboard_event(key, ButtonState::Pressed);
                    } else if frame == step.end_frame() {
                        input_state.handle_keyboard_event(key, ButtonState::Released);
                    }
                }
                ScriptedAction::MouseMotion(delta) => {
                    if (step.first_frame..step.end_frame()).contains(&frame) {
                        input_state.handle_mouse_motion(delta);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_key() {
        let script = ScriptedInput::new(vec![ScriptedStep::hold_key(KeyboardKey::A, 2, 3)], 0);
        assert_eq!(script.period(), 6);

        let mut input_state = InputState::new();
        let mut down_frames = Vec::default();
        for frame in 0..6 {
            script.update(frame, &mut input_state);
            if input_state.is_key_just_down(KeyboardKey::A) {
                assert_eq!(frame, 2);
            }
            if input_state.is_key_just_up(KeyboardKey::A) {
                assert_eq!(frame, 5);
            }
            if input_state.is_key_down(KeyboardKey::A) {
                down_frames.push(frame);
            }
            input_state.end_frame();
        }

        assert_eq!(down_frames, vec![2, 3, 4]);
    }

    #[test]
    fn test_script_repeats() {
        let script = ScriptedInput::new(
            vec![ScriptedStep::mouse_motion(glam::Vec2::new(1.0, 0.0), 0, 1)],
            4,
        );

        let mut input_state = InputState::new();
        let mut moved_frames = Vec::default();
        for frame in 0..9 {
            script.update(frame, &mut input_state);
            if input_state.mouse_motion() != glam::Vec2::ZERO {
                moved_frames.push(frame);
            }
            input_state.end_frame();
        }

        assert_eq!(moved_frames, vec![0, 4, 8]);
    }

    #[test]
    fn test_fly_around_releases_every_key() {
        let script = ScriptedInput::fly_around();
        let mut input_state = InputState::new();
        for frame in 0..script.period() as u64 {
            script.update(frame, &mut input_state);
            input_state.end_frame();
        }

        for &key in &[
            KeyboardKey::W,
            KeyboardKey::S,
            KeyboardKey::D,
            KeyboardKey::F,
            KeyboardKey::LShift,
        ] {
            assert!(!input_state.is_key_down(key), "{:?} is still held", key);
        }
    }
}
