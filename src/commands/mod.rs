//! CLI commands implementation

pub mod ddos;
pub mod live;
pub mod offline;
pub mod status;

pub use ddos::*;
pub use live::*;
pub use offline::*;
pub use status::*;
