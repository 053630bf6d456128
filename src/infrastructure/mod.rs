pub mod csv_candles;
pub mod mock;
pub mod observability;
pub mod persistence;
pub mod repositories;

pub use csv_candles::CsvCandleSource;
pub use mock::{MockBroker, PriceFeed, SimulatedCandleSource};
pub use repositories::{InMemoryExperienceStore, InMemoryModelStore, InMemoryTradeLedger};
