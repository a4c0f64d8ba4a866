pub mod capture_loop;
pub mod capture_session;
pub mod shared;
