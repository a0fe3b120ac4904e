/*! Crate-wide error type.

Every error kind named in the design is represented as its own variant,
rather than folding transport, codec and network-lookup failures into one
opaque string. Callers that only care about a family of failures (timeouts,
say) can still match broadly with `Error::Timeout | Error::IncompleteResponse`.
*/
/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the codec, transport, network model and master engine.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A 14-bit request id was negative or exceeded [`crate::constants::PARITY_MASK`].
    #[error("invalid request id: {0:#06x}")]
    InvalidRequest(u32),

    /// No first byte of a response arrived within the request timeout.
    #[error("timed out waiting for response")]
    Timeout,

    /// The response stream ended before `size` data bytes were collected.
    #[error("incomplete response: got {got} of {want} bytes")]
    IncompleteResponse {
        /// Bytes actually collected.
        got: usize,
        /// Bytes the frame's `size` field promised.
        want: usize,
    },

    /// The checksum byte did not match the recomputed checksum.
    #[error("checksum error: got {got:#04x}, want {want:#04x}")]
    ChecksumError {
        /// Checksum byte found on the wire.
        got: u8,
        /// Checksum recomputed from the payload.
        want: u8,
    },

    /// A sniffed request word's parity bits did not match its id bits.
    #[error("header parity error on word {0:#06x}")]
    HeaderError(u16),

    /// One-wire echo of our own transmission never arrived.
    #[error("self-echo timeout")]
    SelfEchoTimeout,

    /// More than one virtual bus member responded to the same request.
    #[error("bus contention on request {0:#06x}")]
    BusContention(u32),

    /// A `Mapping` encoder was asked to encode a label it does not know.
    #[error("{encoder}: unknown label {label:?}")]
    UnknownLabel {
        /// Name of the encoder.
        encoder: String,
        /// Label that could not be encoded.
        label: String,
    },

    /// A `Mapping` encoder was asked to decode a code it does not know.
    #[error("{encoder}: unmapped code {code}")]
    UnmappedCode {
        /// Name of the encoder.
        encoder: String,
        /// Code that could not be decoded.
        code: i64,
    },

    /// `None` encoder was asked to encode a non-integer value.
    #[error("cannot encode non-integer value {0:?}")]
    NonInteger(String),

    /// A network/request/encoder/schedule lookup by name or id failed.
    #[error("no such {kind}: {key}")]
    Lookup {
        /// What was being looked up (`"node"`, `"request"`, ...).
        kind: &'static str,
        /// The name or id that did not resolve.
        key: String,
    },

    /// The network JSON description was malformed or missing a field.
    #[error("config error: {0}")]
    Config(String),

    /// A signal's bit layout does not fit within its request's payload.
    #[error("signal {signal} in request {request}: {reason}")]
    LayoutError {
        /// Name of the offending request.
        request: String,
        /// Name of the offending signal.
        signal: String,
        /// What went wrong.
        reason: String,
    },

    /// The transport could not resolve a response to a user request's
    /// registered signal set, or the waiter's timeout elapsed.
    #[error("transport error while waiting on request")]
    TransportError,

    /// Underlying byte-stream IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The serial port backend failed to open or configure the port.
    #[error("serial port error: {0}")]
    SerialPort(#[from] serialport::Error),
}
