pub mod cancel;
pub mod config;
pub mod domain;
pub mod error;
pub mod lapis;
pub mod map2d;
pub mod mutation;
pub mod operator;
pub mod output;
pub mod queries;
mod sync;
pub mod temporal;
