// Per-symbol scanner, lifecycle tracker, stop manager and session filter
pub mod agents;

// Volume profile, VWAP and anchoring
pub mod market_structure;

// Probability engine and training
pub mod ml;

// Account gate, spread guard, cooldown and sizing
pub mod risk_management;

// Bootstrap and scheduler
pub mod system;

// Setup detection and trade planning
pub mod targeting;
