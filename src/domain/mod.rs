// Time source
pub mod clock;

// Domain-specific error types
pub mod errors;

// Market structure value objects
pub mod market;

// Model contract
pub mod ml;

// Port interfaces
pub mod ports;

// Repository traits
pub mod repositories;

// Core trading domain
pub mod trading;
