pub mod config;
pub mod event;
pub mod melody;
pub mod note;
pub mod songs;
