pub mod academic;
pub mod attendance;
pub mod auth;
pub mod core;
pub mod nutrition;
pub mod personnel;
pub mod reports;
pub mod services;
pub mod students;
pub mod supply;
