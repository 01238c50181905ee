pub mod class_group;
pub mod parent;
pub mod role;
pub mod role_permission;
pub mod student;
pub mod student_parent;
pub mod upload_log;
pub mod upload_session;
pub mod user;
pub mod year_group;
