pub mod member_code;
pub mod phone;

pub use member_code::*;
pub use phone::*;
