//! Client-facing and inter-region services.
//!
//! `frontend` holds the protocol logic shared by the gRPC surface and the
//! in-process node API; `lock` and `region` are the tonic service
//! implementations.

mod frontend;
mod lock;
mod region;

pub use frontend::{
    AcquireReply, CheckReply, ExtendReply, LockFrontend, ReleaseReply, MAX_ID_LEN,
};
pub use lock::LockServiceImpl;
pub use region::RegionServiceImpl;
