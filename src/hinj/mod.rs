pub mod packet;
pub mod proxy;

pub use packet::{read_message, write_message, Packet};
pub use proxy::InjectionProxy;
