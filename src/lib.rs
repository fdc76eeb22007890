#![forbid(unsafe_code)]

pub mod api;
pub mod assemble;
pub mod assets;
pub mod categories;
pub mod cleanup;
pub mod cli;
pub mod discover;
pub mod dom;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod formats;
pub mod logging;
pub mod paths;
pub mod profile;
pub mod route;
pub mod rules;
pub mod run;
pub mod transform;
