pub mod memory;
pub mod nats;
