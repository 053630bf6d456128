pub mod in_memory;

pub use in_memory::{InMemoryExperienceStore, InMemoryModelStore, InMemoryTradeLedger};
