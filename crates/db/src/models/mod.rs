pub mod call;
pub mod live_session;
