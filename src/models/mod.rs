// src/models/mod.rs
pub mod lobby;
pub mod user;

pub use lobby::{Lobby, NewLobby, Participant};
pub use user::{ApiResponse, Balance, PaginatedResponse};
