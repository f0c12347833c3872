//! # pet-dispatch
//!
//! Fans a sync request out to every configured backend (in-process for the
//! local transport, `pet backend-run` over the remote shell otherwise) and
//! folds the per-backend reports into one aggregate outcome. Also hosts the
//! webhook relay parsing that turns push notifications into sync requests.

pub mod dispatch;
pub mod error;
pub mod relay;

pub use dispatch::{dispatch, run_local};
pub use error::DispatchError;
pub use relay::HookFormat;
