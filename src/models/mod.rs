pub mod assignment;
pub mod attachment;
pub mod department;
pub mod request;
pub mod user;
