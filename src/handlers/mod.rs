pub mod member;
pub mod pass;

pub use member::{admin_config, member_config};
pub use pass::pass_config;
