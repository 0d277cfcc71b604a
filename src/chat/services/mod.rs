pub mod backend_client;
pub mod share_gateway;
pub mod stream_decoder;
pub mod title;

pub use backend_client::{BackendClient, ChatRequestBody, EventStream, TurnParams};
pub use share_gateway::{ShareError, ShareGateway};
pub use stream_decoder::{EventDecoder, StreamEvent};
