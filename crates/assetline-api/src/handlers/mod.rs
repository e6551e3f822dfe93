pub mod coordinators;
pub mod events;
pub mod health;
