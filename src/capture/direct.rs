//! In-process capture over the device mux.
//!
//! Connects to the usbmuxd socket, tunnels to the device's screenshot
//! service, and speaks the DeviceLink screenshot protocol directly, avoiding
//! a subprocess per frame. Service provisioning (pairing, lockdown) is
//! handled outside this tool; the service port comes from configuration.

use async_trait::async_trait;
use plist::Value;
use std::io::Cursor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::process::Command;
use tracing::{debug, info};

use super::{CaptureBackend, DdiCache};
use crate::error::{CaptureError, Result};

/// Mux socket path override
const MUX_SOCKET_ENV: &str = "USBMUXD_SOCKET_ADDRESS";
const DEFAULT_MUX_SOCKET: &str = "/var/run/usbmuxd";

/// usbmuxd framed-plist message type
const MUX_MESSAGE_PLIST: u32 = 8;

pub struct DirectCapture {
    udid: Option<String>,
    screenshot_port: Option<u16>,
    session: Option<ScreenshotSession>,
}

impl DirectCapture {
    pub fn new(udid: Option<String>, screenshot_port: Option<u16>) -> Self {
        Self {
            udid,
            screenshot_port,
            session: None,
        }
    }

    /// Best-effort developer disk image mount. Failure is swallowed: the
    /// service connect produces the clearer error.
    async fn try_mount(&self) {
        if let Some(cache) = DdiCache::default_location() {
            if cache.is_complete() {
                debug!(
                    "developer disk image cached at {}",
                    cache.dir().display()
                );
            }
        }

        let mut command = Command::new("pymobiledevice3");
        command.args(["mounter", "auto-mount"]);
        if let Some(udid) = &self.udid {
            command.args(["--udid", udid]);
        }
        match command.output().await {
            Ok(output) if output.status.success() => {
                debug!("developer disk image mounted");
            }
            Ok(output) => {
                debug!(
                    "auto-mount failed ({}): {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => debug!("auto-mount not attempted: {}", e),
        }
    }
}

#[async_trait]
impl CaptureBackend for DirectCapture {
    async fn start(&mut self) -> Result<()> {
        self.try_mount().await;

        let port = self.screenshot_port.ok_or_else(|| CaptureError::NotAvailable {
            details: "screenshot service port not configured (capture.screenshot_port)"
                .to_string(),
        })?;

        let session = ScreenshotSession::open(self.udid.as_deref(), port).await?;
        info!("screenshot service session established");
        self.session = Some(session);
        Ok(())
    }

    async fn capture_frame(&mut self) -> Result<Vec<u8>> {
        let session = self.session.as_mut().ok_or_else(|| CaptureError::Protocol {
            details: "screenshot session not started".to_string(),
        })?;
        session.capture().await
    }

    async fn stop(&mut self) {
        self.session = None;
    }
}

/// A DeviceLink screenshot session tunnelled through usbmuxd
struct ScreenshotSession {
    stream: UnixStream,
    tag: u32,
}

impl ScreenshotSession {
    async fn open(udid: Option<&str>, service_port: u16) -> Result<Self> {
        let socket_path = std::env::var(MUX_SOCKET_ENV)
            .unwrap_or_else(|_| DEFAULT_MUX_SOCKET.to_string());
        let stream = UnixStream::connect(&socket_path).await.map_err(|e| {
            CaptureError::Protocol {
                details: format!("cannot reach usbmuxd at {}: {}", socket_path, e),
            }
        })?;
        let mut session = Self { stream, tag: 0 };

        let device_id = session.find_device(udid).await?;
        session.connect_to_port(device_id, service_port).await?;
        session.version_exchange().await?;
        Ok(session)
    }

    async fn find_device(&mut self, udid: Option<&str>) -> Result<u64> {
        let mut request = plist::Dictionary::new();
        request.insert("MessageType".into(), Value::String("ListDevices".into()));
        request.insert(
            "ProgName".into(),
            Value::String("xtool-preview".into()),
        );
        request.insert(
            "ClientVersionString".into(),
            Value::String("xtool-preview".into()),
        );
        self.send_mux(Value::Dictionary(request)).await?;
        let reply = self.recv_mux().await?;

        let devices = reply
            .as_dictionary()
            .and_then(|d| d.get("DeviceList"))
            .and_then(Value::as_array)
            .ok_or_else(|| protocol("malformed ListDevices reply"))?;

        for device in devices {
            let Some(dict) = device.as_dictionary() else {
                continue;
            };
            let serial = dict
                .get("Properties")
                .and_then(Value::as_dictionary)
                .and_then(|p| p.get("SerialNumber"))
                .and_then(Value::as_string);
            let matches = match udid {
                Some(wanted) => serial == Some(wanted),
                None => true,
            };
            if matches {
                if let Some(id) = dict.get("DeviceID").and_then(Value::as_unsigned_integer) {
                    return Ok(id);
                }
            }
        }

        Err(CaptureError::DeviceNotFound {
            udid: udid.map(str::to_string),
        }
        .into())
    }

    async fn connect_to_port(&mut self, device_id: u64, port: u16) -> Result<()> {
        let mut request = plist::Dictionary::new();
        request.insert("MessageType".into(), Value::String("Connect".into()));
        request.insert("DeviceID".into(), Value::Integer(device_id.into()));
        request.insert(
            "PortNumber".into(),
            Value::Integer(u64::from(mux_port(port)).into()),
        );
        self.send_mux(Value::Dictionary(request)).await?;

        let reply = self.recv_mux().await?;
        let number = reply
            .as_dictionary()
            .and_then(|d| d.get("Number"))
            .and_then(Value::as_unsigned_integer)
            .ok_or_else(|| protocol("malformed Connect reply"))?;
        if number != 0 {
            return Err(protocol(&format!("mux connect refused (result {})", number)).into());
        }
        debug!("connected to device {} port {}", device_id, port);
        Ok(())
    }

    /// DeviceLink version exchange: the service leads, we acknowledge.
    async fn version_exchange(&mut self) -> Result<()> {
        let hello = self.recv_dl().await?;
        let items = hello
            .as_array()
            .ok_or_else(|| protocol("malformed version exchange"))?;
        if items.first().and_then(Value::as_string) != Some("DLMessageVersionExchange") {
            return Err(protocol("unexpected DeviceLink greeting").into());
        }
        let major = items
            .get(1)
            .and_then(Value::as_unsigned_integer)
            .unwrap_or(300);

        self.send_dl(Value::Array(vec![
            Value::String("DLMessageVersionExchange".into()),
            Value::String("DLVersionsOk".into()),
            Value::Integer(major.into()),
        ]))
        .await?;

        let ready = self.recv_dl().await?;
        match ready.as_array().and_then(|a| a.first()).and_then(Value::as_string) {
            Some("DLMessageDeviceReady") => Ok(()),
            other => Err(protocol(&format!(
                "service not ready after version exchange: {:?}",
                other
            ))
            .into()),
        }
    }

    async fn capture(&mut self) -> Result<Vec<u8>> {
        let mut request = plist::Dictionary::new();
        request.insert(
            "MessageType".into(),
            Value::String("ScreenShotRequest".into()),
        );
        self.send_dl(Value::Array(vec![
            Value::String("DLMessageProcessMessage".into()),
            Value::Dictionary(request),
        ]))
        .await?;

        let reply = self.recv_dl().await?;
        let body = reply
            .as_array()
            .and_then(|a| a.get(1))
            .and_then(Value::as_dictionary)
            .ok_or_else(|| protocol("malformed screenshot reply"))?;
        match body.get("ScreenShotData") {
            Some(Value::Data(bytes)) => Ok(bytes.clone()),
            _ => Err(protocol("screenshot reply carried no image data").into()),
        }
    }

    async fn send_mux(&mut self, message: Value) -> Result<()> {
        let mut payload = Vec::new();
        message
            .to_writer_xml(&mut payload)
            .map_err(|e| protocol(&format!("plist encode failed: {}", e)))?;

        self.tag += 1;
        let mut frame = Vec::with_capacity(16 + payload.len());
        frame.extend_from_slice(&(16 + payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&1u32.to_le_bytes());
        frame.extend_from_slice(&MUX_MESSAGE_PLIST.to_le_bytes());
        frame.extend_from_slice(&self.tag.to_le_bytes());
        frame.extend_from_slice(&payload);
        self.stream
            .write_all(&frame)
            .await
            .map_err(|e| protocol(&format!("mux write failed: {}", e)))?;
        Ok(())
    }

    async fn recv_mux(&mut self) -> Result<Value> {
        let mut header = [0u8; 16];
        self.stream
            .read_exact(&mut header)
            .await
            .map_err(|e| protocol(&format!("mux read failed: {}", e)))?;
        let length = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
        let payload_len = length
            .checked_sub(16)
            .ok_or_else(|| protocol("mux frame too short"))?;

        let mut payload = vec![0u8; payload_len];
        self.stream
            .read_exact(&mut payload)
            .await
            .map_err(|e| protocol(&format!("mux read failed: {}", e)))?;
        Value::from_reader(Cursor::new(payload))
            .map_err(|e| protocol(&format!("plist decode failed: {}", e)).into())
    }

    async fn send_dl(&mut self, message: Value) -> Result<()> {
        let mut payload = Vec::new();
        message
            .to_writer_binary(&mut payload)
            .map_err(|e| protocol(&format!("plist encode failed: {}", e)))?;
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&payload);
        self.stream
            .write_all(&frame)
            .await
            .map_err(|e| protocol(&format!("service write failed: {}", e)))?;
        Ok(())
    }

    async fn recv_dl(&mut self) -> Result<Value> {
        let mut header = [0u8; 4];
        self.stream
            .read_exact(&mut header)
            .await
            .map_err(|e| protocol(&format!("service read failed: {}", e)))?;
        let length = u32::from_be_bytes(header) as usize;
        let mut payload = vec![0u8; length];
        self.stream
            .read_exact(&mut payload)
            .await
            .map_err(|e| protocol(&format!("service read failed: {}", e)))?;
        Value::from_reader(Cursor::new(payload))
            .map_err(|e| protocol(&format!("plist decode failed: {}", e)).into())
    }
}

/// usbmuxd expects the destination port in network byte order
fn mux_port(port: u16) -> u16 {
    port.swap_bytes()
}

fn protocol(details: &str) -> CaptureError {
    CaptureError::Protocol {
        details: details.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mux_port_is_network_byte_order() {
        assert_eq!(mux_port(62078), 62078u16.swap_bytes());
        assert_eq!(mux_port(0x1234), 0x3412);
    }

    #[test]
    fn test_missing_mux_socket_is_protocol_error() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        std::env::set_var(MUX_SOCKET_ENV, "/nonexistent/usbmuxd.sock");
        let err = rt
            .block_on(ScreenshotSession::open(None, 1234))
            .unwrap_err();
        std::env::remove_var(MUX_SOCKET_ENV);
        assert!(err.to_string().contains("usbmuxd"));
    }
}
