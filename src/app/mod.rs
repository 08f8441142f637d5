//! Client state and the pure UI reducer

pub mod reducer;
pub mod state;

pub use reducer::{ConnectionState, PlayerLine, UiState};
pub use state::App;
