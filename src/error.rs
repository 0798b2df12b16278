//! Unified error type for the benchmark central.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

/// Top-level error type used across the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A GATT/GAP primitive returned an error.
    Gatt(GattError),

    /// Allocating a vendor-specific 128-bit UUID base failed.
    UuidRegistration(GattError),

    /// The service UUID could not be registered for discovery.
    DiscoveryRegistration(GattError),

    /// A bounded queue had no room left.
    QueueFull,

    /// Buffer too small for the requested operation.
    BufferOverflow,
}

/// Result of a radio write/read issue call.
///
/// Mirrors the handful of SoftDevice codes the state machine reacts to;
/// everything else is carried verbatim in [`GattError::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GattError {
    /// Bad handle, length or argument.
    InvalidParameter,
    /// No connection (or the stack is in the wrong state).
    InvalidState,
    /// A GATT procedure is already in progress.
    Busy,
    /// No TX buffers left for write-without-response.
    ResourceExhausted,
    /// Raw stack error code.
    Other(u32),
}

// SoftDevice error codes (nrf_error.h / ble_err.h).
const NRF_SUCCESS: u32 = 0;
const NRF_ERROR_INVALID_PARAM: u32 = 7;
const NRF_ERROR_INVALID_STATE: u32 = 8;
const NRF_ERROR_INVALID_LENGTH: u32 = 9;
const NRF_ERROR_DATA_SIZE: u32 = 12;
const NRF_ERROR_NULL: u32 = 14;
const NRF_ERROR_BUSY: u32 = 17;
const NRF_ERROR_RESOURCES: u32 = 19;
const BLE_ERROR_INVALID_CONN_HANDLE: u32 = 0x3002;

impl GattError {
    /// Map a raw SoftDevice return code.
    pub const fn check(code: u32) -> Result<(), GattError> {
        match code {
            NRF_SUCCESS => Ok(()),
            NRF_ERROR_INVALID_PARAM
            | NRF_ERROR_INVALID_LENGTH
            | NRF_ERROR_DATA_SIZE
            | NRF_ERROR_NULL => Err(GattError::InvalidParameter),
            NRF_ERROR_INVALID_STATE | BLE_ERROR_INVALID_CONN_HANDLE => {
                Err(GattError::InvalidState)
            }
            NRF_ERROR_BUSY => Err(GattError::Busy),
            NRF_ERROR_RESOURCES => Err(GattError::ResourceExhausted),
            other => Err(GattError::Other(other)),
        }
    }

    /// Transient back-pressure from the stack; the operation may be
    /// reissued unchanged.
    pub const fn is_retryable(self) -> bool {
        matches!(self, GattError::Busy | GattError::ResourceExhausted)
    }
}

// Convenience conversions

impl From<GattError> for Error {
    fn from(e: GattError) -> Self {
        Error::Gatt(e)
    }
}
