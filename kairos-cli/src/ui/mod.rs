mod theme;
mod view;

pub use theme::styles;
pub use view::{ViewState, draw};
