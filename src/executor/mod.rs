pub mod capture;
pub mod client;
pub mod coords;
pub mod driver;
pub mod input;
pub mod interpreter;
pub mod trajectory;

pub use self::{
  capture::{PrimaryMonitor, ScreenSource},
  client::RelayClient,
  coords::{ScreenGeometry, is_device_pixel, normalize},
  driver::{RunSummary, TaskRunner},
  input::{EnigoDriver, InputDriver},
  interpreter::{ActionInterpreter, INITIAL_LOCATION, InterpreterSettings},
  trajectory::{PointerTrajectory, TrajectoryPlanner, Waypoint},
};
