use std::fmt::Display;

use console::{style, StyledObject};

use crate::report::RunState;

pub fn bright(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright()
}

pub fn dim(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).dim()
}

pub fn magenta_bold(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).magenta().bold()
}

pub fn bright_green(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright().green()
}

pub fn bright_red(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright().red()
}

/// Green once completed, red once failed, yellow while in flight.
pub fn by_state(state: RunState, text: impl Display) -> StyledObject<String> {
    let styled = style(text.to_string()).bright();
    match state {
        RunState::Completed => styled.green(),
        RunState::Failed => styled.red(),
        RunState::Pending => styled.dim(),
        RunState::Extracting | RunState::MappingLoading => styled.yellow(),
    }
}
