mod eof;
mod err;
mod ok;
mod status;

pub(crate) use eof::EofPacket;
pub(crate) use err::ErrPacket;
pub(crate) use ok::OkPacket;
pub use status::Status;
