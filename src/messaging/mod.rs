/// Messaging layer - outbound transport and message templates
///
/// - MessageTransport trait with a reqwest HTTP implementation
/// - ChannelProfile (the sending identity a run executes under)
/// - Template persistence for send_template nodes

pub mod templates;
pub mod transport;

pub use templates::{MessageTemplate, TemplateStorage};
pub use transport::{ChannelProfile, HttpMessageTransport, MessageTransport, ReplyButton};
