pub mod error;
pub mod html_page;
pub mod page;
pub mod session;
