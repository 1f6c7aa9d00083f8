//! 硬件 MIDI 端口 (midir)
//!
//! 按名称打开输入/输出端口。输入回调把字节喂给 `MidiBridge`，输出端口
//! 登记到 `MidiOutputs`。

use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use tracing::{info, trace};

use crate::error::{IngestionError, Result};
use crate::midi::MidiBridge;
use crate::midi_out::MidiOutPort;

const CLIENT_NAME: &str = "osc-relay";

fn port_error(port: &str, reason: impl ToString) -> IngestionError {
    IngestionError::MidiPort {
        port: port.to_string(),
        reason: reason.to_string(),
    }
}

/// 已连接的输入端口；drop 时断开
pub struct MidiInputPort {
    port: String,
    _connection: MidiInputConnection<()>,
}

impl MidiInputPort {
    /// 打开名为 `port` 的输入端口并把收到的消息喂给 `bridge`
    ///
    /// # Errors
    /// 端口不存在或连接失败时返回 `MidiPort`
    pub fn open(port: &str, bridge: MidiBridge) -> Result<Self> {
        let mut input = MidiInput::new(CLIENT_NAME).map_err(|e| port_error(port, e))?;
        input.ignore(Ignore::None);

        let target = input
            .ports()
            .into_iter()
            .find(|p| input.port_name(p).is_ok_and(|name| name == port))
            .ok_or_else(|| port_error(port, "no input port with this name"))?;

        let device = bridge.device().to_string();
        let connection = input
            .connect(
                &target,
                CLIENT_NAME,
                move |_stamp, bytes, _| {
                    if let Err(e) = bridge.feed(bytes) {
                        trace!(device = %bridge.device(), error = %e, "MIDI 输入未入队");
                    }
                },
                (),
            )
            .map_err(|e| port_error(port, e))?;

        info!(%device, %port, "MIDI 输入端口已打开");
        Ok(Self {
            port: port.to_string(),
            _connection: connection,
        })
    }

    /// 端口名
    pub fn port_name(&self) -> &str {
        &self.port
    }
}

/// 已连接的输出端口
pub struct MidirOutPort {
    port: String,
    connection: MidiOutputConnection,
}

impl MidirOutPort {
    /// 打开名为 `port` 的输出端口
    ///
    /// # Errors
    /// 端口不存在或连接失败时返回 `MidiPort`
    pub fn open(port: &str) -> Result<Self> {
        let output = MidiOutput::new(CLIENT_NAME).map_err(|e| port_error(port, e))?;
        let target = output
            .ports()
            .into_iter()
            .find(|p| output.port_name(p).is_ok_and(|name| name == port))
            .ok_or_else(|| port_error(port, "no output port with this name"))?;
        let connection = output
            .connect(&target, CLIENT_NAME)
            .map_err(|e| port_error(port, e))?;

        info!(%port, "MIDI 输出端口已打开");
        Ok(Self {
            port: port.to_string(),
            connection,
        })
    }
}

impl MidiOutPort for MidirOutPort {
    fn port_name(&self) -> &str {
        &self.port
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.connection
            .send(bytes)
            .map_err(|e| port_error(&self.port, e))
    }
}
