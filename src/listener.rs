//! Inbound OSC control surface.
//!
//! Each address maps to one [`ControlCommand`], which maps to one controller
//! mutator. Unknown addresses and malformed arguments are logged and dropped.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use rosc::{OscMessage, OscPacket, OscType};

use crate::controller::{ConfigUpdate, InputKind, PipelineController};
use crate::error::PipelineResult;

pub const DEFAULT_LISTEN_PORT: u16 = 9000;

/// How long a receive blocks before the shutdown flag is checked again.
pub const READ_TIMEOUT: Duration = Duration::from_millis(250);

const MAX_PACKET: usize = 65_536;

#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Start,
    Stop,
    Pause,
    StartAll,
    StopVideoStream,
    SelectInput(InputKind),
    VideoFile(PathBuf),
    Camera(u32),
    LoopVideo(bool),
    OscIp(String),
    OscPort(u16),
    StartOsc,
    StopOsc,
    StartVideoOutput,
    StopVideoOutput,
    Overlay(bool),
    Detector(String),
    Fps(u32),
}

impl ControlCommand {
    /// Translate one OSC message.
    pub fn parse(msg: &OscMessage) -> Result<Self> {
        let args = msg.args.as_slice();
        let command = match msg.addr.as_str() {
            "/posecam/control/start" => Self::Start,
            "/posecam/control/stop" => Self::Stop,
            "/posecam/control/pause" => Self::Pause,
            "/posecam/control/start_all" => Self::StartAll,
            "/posecam/control/stop_video" => Self::StopVideoStream,
            "/posecam/input/select" => Self::SelectInput(string_arg(args)?.parse()?),
            "/posecam/input/file" => Self::VideoFile(PathBuf::from(string_arg(args)?)),
            "/posecam/input/camera" => Self::Camera(int_arg(args)?),
            "/posecam/input/loop" => Self::LoopVideo(bool_arg(args)?),
            "/posecam/output/osc/ip" => Self::OscIp(string_arg(args)?),
            "/posecam/output/osc/port" => Self::OscPort(int_arg(args)?),
            "/posecam/output/osc/start" => Self::StartOsc,
            "/posecam/output/osc/stop" => Self::StopOsc,
            "/posecam/output/video/start" => Self::StartVideoOutput,
            "/posecam/output/video/stop" => Self::StopVideoOutput,
            "/posecam/output/overlay" => Self::Overlay(bool_arg(args)?),
            "/posecam/detector" => Self::Detector(string_arg(args)?),
            "/posecam/fps" => Self::Fps(int_arg(args)?),
            other => bail!("unknown address {}", other),
        };
        Ok(command)
    }

    /// Invoke the matching controller operation.
    ///
    /// Only a failed detector load is returned as an error.
    pub fn apply(self, controller: &PipelineController) -> PipelineResult<()> {
        match self {
            Self::Start => {
                controller.start();
            }
            Self::Stop => controller.stop(),
            Self::Pause => {
                controller.pause();
            }
            Self::StartAll => controller.start_all(),
            Self::StopVideoStream => {
                controller.stop_video_stream();
            }
            Self::SelectInput(input) => update(controller, ConfigUpdate::Input(input)),
            Self::VideoFile(path) => update(controller, ConfigUpdate::VideoFile(Some(path))),
            Self::Camera(id) => update(controller, ConfigUpdate::CameraId(id)),
            Self::LoopVideo(on) => update(controller, ConfigUpdate::LoopVideo(on)),
            Self::OscIp(ip) => update(controller, ConfigUpdate::OscIp(ip)),
            Self::OscPort(port) => update(controller, ConfigUpdate::OscPort(port)),
            Self::StartOsc => {
                controller.start_message_sink();
            }
            Self::StopOsc => controller.stop_message_sink(),
            Self::StartVideoOutput => {
                controller.start_video_sink();
            }
            Self::StopVideoOutput => controller.stop_video_sink(),
            Self::Overlay(on) => update(controller, ConfigUpdate::DrawVideoOverlay(on)),
            Self::Detector(name) => {
                controller.change_detector(&name)?;
            }
            Self::Fps(fps) => update(controller, ConfigUpdate::FpsLimit(fps)),
        }
        Ok(())
    }
}

fn update(controller: &PipelineController, update: ConfigUpdate) {
    controller.update_config(update);
}

fn first(args: &[OscType]) -> Result<&OscType> {
    args.first().ok_or_else(|| anyhow!("missing argument"))
}

fn string_arg(args: &[OscType]) -> Result<String> {
    match first(args)? {
        OscType::String(s) => Ok(s.clone()),
        other => bail!("expected a string, got {:?}", other),
    }
}

fn int_arg<T: TryFrom<i64>>(args: &[OscType]) -> Result<T> {
    let value = match first(args)? {
        OscType::Int(v) => i64::from(*v),
        OscType::Long(v) => *v,
        OscType::Float(v) if v.fract() == 0.0 => *v as i64,
        OscType::Double(v) if v.fract() == 0.0 => *v as i64,
        OscType::String(s) => s.trim().parse().context("expected an integer")?,
        other => bail!("expected an integer, got {:?}", other),
    };
    T::try_from(value).map_err(|_| anyhow!("{} is out of range", value))
}

fn bool_arg(args: &[OscType]) -> Result<bool> {
    match first(args)? {
        OscType::Bool(b) => Ok(*b),
        OscType::Int(v) => Ok(*v != 0),
        OscType::Long(v) => Ok(*v != 0),
        OscType::Float(v) => Ok(*v != 0.0),
        OscType::String(s) => match s.to_ascii_lowercase().as_str() {
            "1" | "true" | "on" => Ok(true),
            "0" | "false" | "off" => Ok(false),
            other => bail!("expected a boolean, got '{}'", other),
        },
        other => bail!("expected a boolean, got {:?}", other),
    }
}

/// UDP socket receiving control messages.
pub struct CommandListener {
    socket: UdpSocket,
}

impl CommandListener {
    pub fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddr::from(([0u8; 4], port));
        let socket =
            UdpSocket::bind(addr).with_context(|| format!("Failed to bind OSC listener on {}", addr))?;
        socket
            .set_read_timeout(Some(READ_TIMEOUT))
            .context("Failed to set listener read timeout")?;
        tracing::info!("Listening for OSC commands on {}", addr);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive and apply commands until the controller shuts down.
    ///
    /// A detector that fails to load shuts the controller down and is
    /// returned as an error.
    pub fn serve(&self, controller: &PipelineController) -> Result<()> {
        let mut buf = vec![0u8; MAX_PACKET];
        while !controller.is_shutting_down() {
            let (len, from) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
                Err(e) => {
                    tracing::warn!("OSC listener receive failed: {}", e);
                    continue;
                }
            };

            let packet = match rosc::decoder::decode_udp(&buf[..len]) {
                Ok((_, packet)) => packet,
                Err(e) => {
                    tracing::warn!("Undecodable OSC packet from {}: {:?}", from, e);
                    continue;
                }
            };

            if let Err(e) = handle_packet(controller, packet) {
                controller.shutdown();
                return Err(e.into());
            }
        }
        tracing::debug!("OSC listener stopped");
        Ok(())
    }
}

/// Apply every message in `packet`, descending into bundles.
pub fn handle_packet(controller: &PipelineController, packet: OscPacket) -> PipelineResult<()> {
    match packet {
        OscPacket::Message(msg) => match ControlCommand::parse(&msg) {
            Ok(command) => {
                tracing::debug!("OSC {} -> {:?}", msg.addr, command);
                command.apply(controller)
            }
            Err(e) => {
                tracing::warn!("Ignoring OSC {}: {:#}", msg.addr, e);
                Ok(())
            }
        },
        OscPacket::Bundle(bundle) => {
            for packet in bundle.content {
                handle_packet(controller, packet)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }

    #[test]
    fn parses_argumentless_controls() {
        for (addr, expected) in [
            ("/posecam/control/start", ControlCommand::Start),
            ("/posecam/control/stop", ControlCommand::Stop),
            ("/posecam/control/pause", ControlCommand::Pause),
            ("/posecam/control/start_all", ControlCommand::StartAll),
            ("/posecam/control/stop_video", ControlCommand::StopVideoStream),
            ("/posecam/output/osc/start", ControlCommand::StartOsc),
            ("/posecam/output/video/stop", ControlCommand::StopVideoOutput),
        ] {
            assert_eq!(ControlCommand::parse(&msg(addr, vec![])).unwrap(), expected);
        }
    }

    #[test]
    fn parses_typed_arguments() {
        assert_eq!(
            ControlCommand::parse(&msg("/posecam/input/select", vec![OscType::String("file".into())]))
                .unwrap(),
            ControlCommand::SelectInput(InputKind::File)
        );
        assert_eq!(
            ControlCommand::parse(&msg("/posecam/output/osc/port", vec![OscType::Int(9001)])).unwrap(),
            ControlCommand::OscPort(9001)
        );
        assert_eq!(
            ControlCommand::parse(&msg("/posecam/fps", vec![OscType::Float(24.0)])).unwrap(),
            ControlCommand::Fps(24)
        );
        assert_eq!(
            ControlCommand::parse(&msg("/posecam/input/loop", vec![OscType::Int(1)])).unwrap(),
            ControlCommand::LoopVideo(true)
        );
        assert_eq!(
            ControlCommand::parse(&msg("/posecam/output/overlay", vec![OscType::Bool(false)])).unwrap(),
            ControlCommand::Overlay(false)
        );
    }

    #[test]
    fn rejects_unknown_addresses_and_bad_arguments() {
        assert!(ControlCommand::parse(&msg("/posecam/unknown", vec![])).is_err());
        assert!(ControlCommand::parse(&msg("/posecam/output/osc/port", vec![])).is_err());
        assert!(
            ControlCommand::parse(&msg("/posecam/output/osc/port", vec![OscType::Int(70_000)])).is_err()
        );
        assert!(
            ControlCommand::parse(&msg("/posecam/input/select", vec![OscType::String("ndi".into())]))
                .is_err()
        );
        assert!(ControlCommand::parse(&msg("/posecam/fps", vec![OscType::Float(2.5)])).is_err());
    }
}
