pub mod messages;
pub mod neighbor;
pub mod route;
