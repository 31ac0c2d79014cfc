pub mod conversation;
pub mod event;
pub mod tenant;
pub mod user;
