// ── Port enumeration and DMX USB Pro matching ──
//
// `PortInfo` is whatever the OS enumeration layer reports for one serial
// port. The matcher decides which of those are DMX USB Pro compatible.

use tracing::trace;

use crate::error::EnumerationError;

/// USB vendor id of the FTDI bridge inside a DMX USB Pro.
pub const DMX_USB_PRO_VENDOR_ID: &str = "0403";
/// USB product id of the FTDI bridge inside a DMX USB Pro.
pub const DMX_USB_PRO_PRODUCT_ID: &str = "6001";

/// Raw enumerated port record, recreated on every scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortInfo {
    pub path: String,
    pub vendor_id: String,
    pub product_id: String,
    pub product: String,
    pub serial_number: String,
}

/// Whether `port` looks like a DMX USB Pro.
///
/// Exact comparison of the identifier strings; empty or malformed ids
/// simply do not match.
pub fn matches(port: &PortInfo) -> bool {
    port.vendor_id == DMX_USB_PRO_VENDOR_ID && port.product_id == DMX_USB_PRO_PRODUCT_ID
}

/// OS-level serial port enumeration.
pub trait PortEnumerator: Send + Sync {
    fn list_ports(&self) -> Result<Vec<PortInfo>, EnumerationError>;
}

/// [`PortEnumerator`] backed by the `serialport` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortEnumerator;

impl PortEnumerator for SerialPortEnumerator {
    fn list_ports(&self) -> Result<Vec<PortInfo>, EnumerationError> {
        let ports =
            serialport::available_ports().map_err(|e| EnumerationError::new(e.to_string()))?;
        trace!(count = ports.len(), "enumerated serial ports");
        Ok(ports.into_iter().map(port_info_from).collect())
    }
}

fn port_info_from(info: serialport::SerialPortInfo) -> PortInfo {
    match info.port_type {
        serialport::SerialPortType::UsbPort(usb) => PortInfo {
            path: info.port_name,
            vendor_id: format!("{:04x}", usb.vid),
            product_id: format!("{:04x}", usb.pid),
            product: usb.product.unwrap_or_default(),
            serial_number: usb.serial_number.unwrap_or_default(),
        },
        _ => PortInfo {
            path: info.port_name,
            ..PortInfo::default()
        },
    }
}
