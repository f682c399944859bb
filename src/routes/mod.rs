pub mod assignments;
pub mod attachments;
pub mod auth;
pub mod departments;
pub mod health;
pub mod requests;
pub mod users;
