pub mod catalog;
pub mod collector;
pub mod config;
pub mod descriptor;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod gate;
pub mod index;
pub mod output;
pub mod prettify;
pub mod sdmx;
pub mod source;
pub mod store;
pub mod transport;
pub mod unido;
pub mod xml;
