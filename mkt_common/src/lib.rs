mod fx_amount;
pub mod op;
mod points;

pub use fx_amount::FxAmount;
pub use points::Points;
