//! Windows packet interception using WinDivert 2.x.
//!
//! Packets matching the filter are diverted from the network stack and must be
//! re-injected with `send`, otherwise they are lost. Always keep loopback out
//! of the filter.

use windivert::layer::NetworkLayer;
use windivert::packet::WinDivertPacket;
use windivert::prelude::*;
use windivert::CloseAction;

use super::{CaptureBackend, CaptureHandle, CapturedPacket};
use crate::config::CAPTURE_BUFFER_SIZE;
use crate::core::state::Direction;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, Default)]
pub struct WinDivertBackend;

impl CaptureBackend for WinDivertBackend {
    type Handle = WinDivertHandle;

    fn open(&self, filter: &str, priority: i16) -> Result<WinDivertHandle, EngineError> {
        tracing::info!("Opening WinDivert handle (priority {priority}) with filter: {filter}");
        let wd = WinDivert::<NetworkLayer>::network(filter, priority, WinDivertFlags::new())
            .map_err(|e| {
                EngineError::CaptureOpen(format!(
                    "Failed to open WinDivert handle (filter={filter}): {e:?}. \
                     Ensure WinDivert.dll and WinDivert64.sys are next to the executable \
                     and the app is running as administrator."
                ))
            })?;

        Ok(WinDivertHandle {
            wd,
            buf: vec![0u8; CAPTURE_BUFFER_SIZE],
        })
    }
}

pub struct WinDivertHandle {
    wd: WinDivert<NetworkLayer>,
    buf: Vec<u8>,
}

impl CaptureHandle for WinDivertHandle {
    type Packet = WinDivertPacket<'static, NetworkLayer>;

    /// Blocks until the driver diverts a packet.
    fn recv(&mut self) -> Result<Option<Self::Packet>, EngineError> {
        let packet = self
            .wd
            .recv(Some(&mut self.buf))
            .map_err(|e| EngineError::CaptureIo(format!("WinDivert recv error: {e}")))?;
        Ok(Some(packet.into_owned()))
    }

    fn send(&mut self, packet: &Self::Packet) -> Result<(), EngineError> {
        self.wd
            .send(packet)
            .map(|_| ())
            .map_err(|e| EngineError::CaptureIo(format!("WinDivert send error: {e}")))
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.wd
            .close(CloseAction::Nothing)
            .map_err(|e| EngineError::CaptureIo(format!("WinDivert close error: {e}")))
    }
}

impl CapturedPacket for WinDivertPacket<'static, NetworkLayer> {
    fn direction(&self) -> Direction {
        Direction::from_outbound(self.address.outbound())
    }

    fn size(&self) -> usize {
        self.data.len()
    }
}
