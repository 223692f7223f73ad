pub mod stream;
pub mod varint;

pub use stream::{StreamInput, StreamOutput};
