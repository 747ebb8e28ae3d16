//! CLI command implementations

pub mod fingerprint;
pub mod init;
pub mod install;
pub mod invalidate;
pub mod status;

pub use fingerprint::execute as fingerprint;
pub use init::execute as init;
pub use install::execute as install;
pub use invalidate::{execute as invalidate, InvalidateMode};
pub use status::execute as status;
