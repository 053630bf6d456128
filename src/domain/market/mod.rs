// Market analysis domain
pub mod volume_profile;
