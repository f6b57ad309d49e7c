//! Opens the configured database, brings its schema up to date and reports
//! what it holds.

use minicrm::services::{follow_ups, proposals};
use minicrm::state::AppState;
use minicrm::CrmError;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let state = match AppState::new() {
        Ok(state) => state,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    let summary = state.with_request(|db| -> Result<(usize, usize, usize), CrmError> {
        let board = follow_ups::board(db, None)?;
        let pipeline = proposals::board(db)?;
        let active = pipeline.draft.len() + pipeline.sent.len() + pipeline.negotiating.len();
        Ok((board.open.len(), board.closed.len(), active))
    });

    match summary {
        Ok((open, closed, active)) => log::info!(
            "{} open / {} closed opportunities, {} active proposals",
            open,
            closed,
            active
        ),
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    }
}
