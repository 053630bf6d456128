//! Smart targeting: setup detection, momentum filters, stop and target selection.

pub mod logical_target;
pub mod momentum_filter;
pub mod setups;
pub mod smart_stop;
pub mod trade_plan;

pub use logical_target::{RewardRiskBand, TargetLevels, logical_target};
pub use momentum_filter::{MomentumLimits, check_momentum};
pub use setups::{SetupContext, SetupMatch, detect_setup};
pub use smart_stop::smart_stop;
pub use trade_plan::{PlanRejection, TradePlanner};
