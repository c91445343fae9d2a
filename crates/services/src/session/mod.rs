//! Runtime around one sitting: the controller that executes state-machine
//! effects, the countdown task, and the read models for the screen.

mod controller;
mod countdown;
mod view;

pub use controller::{FinishResult, SessionController, TickReport};
pub use countdown::{CountdownDriver, TICK_PERIOD};
pub use view::{QuestionView, SessionView};
