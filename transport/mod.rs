// Transport module: datagram communication backends
pub mod traits;
pub mod udp;
pub mod memory;

pub use traits::*;
pub use udp::*;
pub use memory::*;
