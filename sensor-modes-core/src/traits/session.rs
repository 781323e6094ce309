use crate::models::error::DeviceError;

/// A live hardware session owned by a `ResourceHandle`.
///
/// `close` is called at most once by the handle; implementations should still
/// tolerate repeated calls.
pub trait Session: Send {
    fn close(&mut self) -> Result<(), DeviceError>;
}
