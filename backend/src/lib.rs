pub mod auth;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod routes;
pub mod scan;
pub mod storage;
