pub mod risk_manager;
pub mod sizing_engine;

pub use risk_manager::{RiskManager, with_single_reconnect};
pub use sizing_engine::SizingEngine;
