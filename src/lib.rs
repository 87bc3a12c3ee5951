pub mod auth;
pub mod broker;
pub mod db;
pub mod error;
pub mod extract;
pub mod message;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod user;
pub mod websocket;

#[cfg(test)]
mod testing;
