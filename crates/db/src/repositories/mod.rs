pub mod call_repo;
pub mod live_session_repo;

pub use call_repo::CallRepo;
pub use live_session_repo::LiveSessionRepo;
