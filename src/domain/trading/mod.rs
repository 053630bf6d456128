// Core trading domain entities and value objects
pub mod signal;
pub mod trade_record;
pub mod types;
