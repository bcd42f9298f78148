pub mod handshake;
pub mod inventory;
pub mod item;
pub mod role;
pub mod session;

pub use handshake::*;
pub use inventory::*;
pub use item::*;
pub use role::*;
pub use session::*;
