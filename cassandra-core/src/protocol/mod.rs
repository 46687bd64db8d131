//! Frame envelope, flags and request/response bodies for the native
//! binary protocol.

pub mod codec;
pub mod constants;
pub mod frame;
pub mod request;
pub mod response;

pub use codec::FrameCodec;
pub use frame::{Frame, FrameHeader, Opcode};
pub use request::{ExecuteRequest, PrepareRequest, QueryParameters, QueryRequest, StartupRequest};
pub use response::{BindMarker, ErrorBody, Prepared, ResultBody, RowsPage};
