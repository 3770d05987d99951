pub mod email_service;
pub mod member_service;
pub mod pass_service;

pub use email_service::EmailNotificationService;
pub use member_service::MemberService;
pub use pass_service::PassService;
