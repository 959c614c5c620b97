pub mod alpha_vantage;
pub mod error;
pub mod news;
pub mod source;

pub use alpha_vantage::AlphaVantageClient;
pub use error::MarketError;
pub use news::NewsClient;
pub use source::{
    AlphaVantageMovementSource, FixedMovementSource, MarketMovementSource, SimulatedMovement,
};
