pub mod email_logs;
pub mod members;
pub mod wallet_passes;

pub use email_logs as email_log_entity;
pub use members as member_entity;
pub use wallet_passes as wallet_pass_entity;
