mod auth;
mod common;
mod upload;
