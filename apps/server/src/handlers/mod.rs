pub mod admin;
pub mod booking;
pub mod content;
pub mod health;
pub mod lead;
