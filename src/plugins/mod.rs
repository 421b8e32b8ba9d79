pub mod config;
#[cfg(feature = "devel")]
pub mod debug;
pub mod first_person_controller;
pub mod game;
pub mod input;
pub mod physics;
pub mod portal;
pub mod trajectory;
