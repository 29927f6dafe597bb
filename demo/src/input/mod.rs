mod input_state;
pub use input_state::*;

mod scripted_input;
pub use scripted_input::*;
