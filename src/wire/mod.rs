pub mod frame;
pub mod messages;
pub mod transport;

pub use frame::{classify, encode_control, extract_inline_audio, mime_sample_rate, Frame};
pub use frame::DEFAULT_INBOUND_RATE_HZ;
pub use transport::{MessageTransport, WsTransport};
