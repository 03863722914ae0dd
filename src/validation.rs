//! Small validation helpers shared by configuration loading and the web API.
use regex::Regex;
use std::net::IpAddr;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid regex pattern")
});

/// Matches `GPIB1::17::INSTR`, `USB0::0x0957::0x1755::MY123::INSTR`, `TCPIP0::host::inst0::INSTR`, ...
static VISA_RESOURCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(GPIB|USB|TCPIP|ASRL|VXI|PXI)\d*(::[^:]+)+::(INSTR|SOCKET|RAW)$")
        .expect("Invalid regex pattern")
});

/// Validates if a given u16 value is a valid port number.
/// By type, the port is already within the 0-65535 range.
/// This function checks that the port is not 0, which is reserved.
///
/// # Arguments
///
/// * `port` - The u16 value to validate.
///
/// # Returns
///
/// * `Ok(())` if the port is valid.
/// * `Err(&'static str)` if the port is invalid.
pub fn is_valid_port(port: u16) -> Result<(), &'static str> {
    if port > 0 {
        Ok(())
    } else {
        Err("Port number must be greater than 0")
    }
}

/// Validates if a given string is a valid IP address.
pub fn is_valid_ip(ip: &str) -> Result<(), &'static str> {
    ip.parse::<IpAddr>().map(|_| ()).map_err(|_| "Invalid IP address")
}

/// Validates if a given string is a usable file path.
///
/// # Returns
///
/// * `Ok(())` if the file path is valid.
/// * `Err(&'static str)` if the file path is empty or contains a null byte.
pub fn is_valid_path(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Err("File path cannot be empty");
    }
    if path.contains('\0') {
        return Err("File path cannot contain null bytes");
    }
    Ok(())
}

/// Validates if a given value is within a specified numeric range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates if a given string is not empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.trim().is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

/// Validates an email address well enough to reject typos in the login form.
pub fn is_valid_email(email: &str) -> Result<(), &'static str> {
    if EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err("Invalid email address")
    }
}

/// Validates a VISA resource string such as `GPIB1::17::INSTR`.
pub fn is_valid_visa_resource(resource: &str) -> Result<(), &'static str> {
    if VISA_RESOURCE_REGEX.is_match(resource) {
        Ok(())
    } else {
        Err("Invalid VISA resource string")
    }
}

/// Validates that a value is a finite number (no NaN, no infinity).
pub fn is_finite(value: f64) -> Result<(), &'static str> {
    if value.is_finite() {
        Ok(())
    } else {
        Err("Value must be a finite number")
    }
}

/// Validates an uploaded file name: a bare name with no directory components.
pub fn is_plain_file_name(name: &str) -> Result<(), &'static str> {
    is_valid_path(name)?;
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err("File name must not contain path separators");
    }
    Ok(())
}
