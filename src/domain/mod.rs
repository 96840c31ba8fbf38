pub mod command;
pub mod constant;
pub mod error;
pub mod record;
pub mod role;
pub mod status;
pub mod timeline;
pub mod view;
