pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod errors;
pub mod extract;
pub mod health;
pub mod state;
pub mod users;

#[cfg(test)]
mod test_utils;
