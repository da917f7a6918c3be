//! HTTP request handlers

pub mod health;
pub mod matching;
pub mod register;
pub mod students;

pub use crate::state::AppState;
pub use health::{health, status, HealthResponse, StatusResponse};
pub use matching::{match_handler, MatchResponse};
pub use register::{register_handler, RegisterResponse};
pub use students::{list_students, StudentSummary};
