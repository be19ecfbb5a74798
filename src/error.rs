use std::io;

use thiserror::Error;
use tokio::sync::mpsc::error::SendError as MpscSendError;
use tokio::sync::oneshot::error::RecvError as OneshotRecvError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("buffer shorter than the minimum header size")]
    ErrShortBuffer,
    #[error("separator byte at offset 3 is not zero")]
    ErrBadSeparator,
    #[error("protocol signature mismatch")]
    ErrBadSignature,
    #[error("unknown or reserved message type")]
    ErrUnknownType,
    #[error("command is not in the supported-commands allow-list")]
    ErrUnsupportedCommand,
    #[error("command must be exactly 4 alphanumeric ASCII bytes")]
    ErrBadCommand,
    #[error("want_ack is set together with is_ack or is_nack")]
    ErrAckWantAckConflict,
    #[error("data flags are set without HAS_DATA")]
    ErrDataFlagWithoutData,
    #[error("HAS_DATA set but declared length leaves no room for a payload")]
    ErrDataSizeInvalid,
    #[error("buffer length does not match a no-data message")]
    ErrLengthMismatch,
    #[error("SESSION flag set while sessions are disabled")]
    ErrSessionDisabled,
    #[error("fragment_index is out of range for fragments_total")]
    ErrFragmentIndexOutOfRange,
    #[error("fragments_total exceeds the configured maximum")]
    ErrTooManyFragments,
    #[error("max_packet_size leaves no room for the minimum data fragment")]
    ErrPacketTooSmall,
    #[error("engine has been shut down")]
    ErrEngineClosed,
    #[error("no socket configured")]
    ErrNoSocket,
    #[error("operation timed out")]
    Timeout,
    #[error("{0}")]
    Other(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("internal channel closed: {0}")]
    MpscSend(String),
    #[error("internal completion channel dropped")]
    OneshotRecv(#[from] OneshotRecvError),
}

// Because Tokio's SendError is parameterized over the message type, we
// lose the payload on conversion; only the fact that the send failed matters
// to callers.
impl<T> From<MpscSendError<T>> for Error {
    fn from(e: MpscSendError<T>) -> Self {
        Error::MpscSend(e.to_string())
    }
}
