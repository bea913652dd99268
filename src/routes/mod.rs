mod admin;
mod api;
mod pages;
mod reviewer;

pub use admin::*;
pub use api::*;
pub use pages::*;
pub use reviewer::*;
