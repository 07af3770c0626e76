//! HTTP request handlers.

pub mod bookings;
pub mod health;

pub use bookings::{auto_assign, create_booking, get_booking, transition};
pub use health::{health, metrics};
