// Library root
// -----------
// The binary (`main.rs`) loads the configuration, sets up logging and hands
// an `ApiClient` to the menu loop in `ui`.
//
// Module responsibilities:
// - `config`: locate and parse `config.json` (token, project id).
// - `api`: blocking HTTP access to the Kualitee API, behind the
//   `KualiteeApi` trait so the modules can run against a fake.
// - `test_cycle` / `defect`: the two interactive modules.
// - `ui`: main menu plus terminal helpers shared by the modules.
// - `models`, `error`, `logging`, `csv_input`: supporting pieces.
pub mod api;
pub mod config;
pub mod csv_input;
pub mod defect;
pub mod error;
pub mod logging;
pub mod models;
pub mod test_cycle;
pub mod ui;
