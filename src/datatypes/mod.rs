mod command_status;
mod inbound_unit;
mod message_state;
pub mod tlv;

pub use command_status::CommandStatus;
pub use inbound_unit::InboundUnit;
pub use message_state::{MessageState, delivery_status};
pub use tlv::Tlv;
