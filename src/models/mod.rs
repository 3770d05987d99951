pub mod member;
pub mod pagination;
pub mod pass;

pub use member::*;
pub use pagination::*;
pub use pass::*;
