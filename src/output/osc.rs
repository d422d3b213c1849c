use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use rosc::{OscBundle, OscMessage, OscPacket, OscTime, OscType};

use super::{FrameContext, MessageSink};
use crate::detect::{landmark_name, DetectionResult};

/// Address layout for outgoing landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OscMode {
    /// One bundle per frame, `/pose/p{subject}/{landmark}` for every subject.
    #[default]
    Bundle,
    /// One message per landmark, `/p1/{name}`, first subject only.
    Legacy,
}

impl FromStr for OscMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bundle" => Ok(Self::Bundle),
            "legacy" => Ok(Self::Legacy),
            other => Err(anyhow!("unknown OSC mode '{}'", other)),
        }
    }
}

impl fmt::Display for OscMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bundle => "bundle",
            Self::Legacy => "legacy",
        })
    }
}

/// "Immediately" time tag.
const IMMEDIATELY: OscTime = OscTime {
    seconds: 0,
    fractional: 1,
};

/// Sends detection results as OSC over UDP
pub struct OscSender {
    socket: UdpSocket,
    target: SocketAddr,
    mode: OscMode,
}

impl OscSender {
    pub fn new(ip: &str, port: u16, mode: OscMode) -> Result<Self> {
        let target = (ip, port)
            .to_socket_addrs()
            .with_context(|| format!("Invalid OSC target {}:{}", ip, port))?
            .next()
            .ok_or_else(|| anyhow!("OSC target {}:{} did not resolve", ip, port))?;

        let bind: SocketAddr = if target.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind).context("Failed to bind OSC socket")?;

        tracing::info!("OSC sender targeting {} ({} mode)", target, mode);
        Ok(Self {
            socket,
            target,
            mode,
        })
    }
}

impl MessageSink for OscSender {
    fn send(&mut self, result: &DetectionResult, context: &FrameContext<'_>) -> Result<()> {
        for packet in frame_packets(result, context, self.mode) {
            let bytes = rosc::encoder::encode(&packet)
                .map_err(|e| anyhow!("Failed to encode OSC packet: {:?}", e))?;
            self.socket
                .send_to(&bytes, self.target)
                .with_context(|| format!("Failed to send OSC packet to {}", self.target))?;
        }
        Ok(())
    }
}

/// Build the packets describing one frame.
pub fn frame_packets(
    result: &DetectionResult,
    context: &FrameContext<'_>,
    mode: OscMode,
) -> Vec<OscPacket> {
    let mut packets = Vec::new();

    if context.wants_metadata() {
        packets.push(OscPacket::Bundle(OscBundle {
            timetag: IMMEDIATELY,
            content: metadata_messages(result, context),
        }));
    }

    match mode {
        OscMode::Bundle => {
            let mut content = Vec::new();
            for (subject, skeleton) in result.skeletons.iter().enumerate() {
                for (index, lm) in skeleton.iter().enumerate() {
                    content.push(message(
                        format!("/pose/p{}/{}", subject + 1, index),
                        vec![
                            OscType::Float(lm.x),
                            OscType::Float(lm.y),
                            OscType::Float(lm.z),
                            OscType::Float(lm.visibility),
                        ],
                    ));
                }
                if let Some(bbox) = result.boxes.get(subject) {
                    content.push(message(
                        format!("/pose/p{}/bbox", subject + 1),
                        vec![
                            OscType::Float(bbox.cx),
                            OscType::Float(bbox.cy),
                            OscType::Float(bbox.w),
                            OscType::Float(bbox.h),
                        ],
                    ));
                }
            }
            if !content.is_empty() {
                packets.push(OscPacket::Bundle(OscBundle {
                    timetag: IMMEDIATELY,
                    content,
                }));
            }
        }
        OscMode::Legacy => {
            if let Some(skeleton) = result.skeletons.first() {
                for (index, lm) in skeleton.iter().enumerate() {
                    packets.push(message(
                        format!("/p1/{}", landmark_name(context.landmark_names, index)),
                        vec![
                            OscType::Float(lm.x),
                            OscType::Float(lm.y),
                            OscType::Float(lm.z),
                        ],
                    ));
                }
                packets.push(message("/numLandmarks".into(), vec![int(skeleton.len())]));
            }
        }
    }

    packets
}

fn metadata_messages(result: &DetectionResult, context: &FrameContext<'_>) -> Vec<OscPacket> {
    vec![
        message(
            "/framecount".into(),
            vec![OscType::Int(i32::try_from(context.frame_count).unwrap_or(i32::MAX))],
        ),
        message("/numPoses".into(), vec![int(result.subject_count())]),
        message("/image-width".into(), vec![int(context.width as usize)]),
        message("/image-height".into(), vec![int(context.height as usize)]),
        message("/model".into(), vec![OscType::String(context.model_name.to_string())]),
        message(
            "/landmarks".into(),
            context
                .landmark_names
                .iter()
                .map(|name| OscType::String((*name).to_string()))
                .collect(),
        ),
    ]
}

fn message(addr: String, args: Vec<OscType>) -> OscPacket {
    OscPacket::Message(OscMessage { addr, args })
}

fn int(value: usize) -> OscType {
    OscType::Int(i32::try_from(value).unwrap_or(i32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Landmark};

    const NAMES: [&str; 2] = ["nose", "eye_l"];

    fn context(frame_count: u64) -> FrameContext<'static> {
        FrameContext {
            frame_count,
            target_fps: 30,
            width: 640,
            height: 480,
            model_name: "test-model",
            landmark_names: &NAMES,
        }
    }

    fn two_subjects() -> DetectionResult {
        let skeleton = vec![
            Landmark::new(0.1, 0.2, 0.0, 0.9),
            Landmark::new(0.3, 0.4, 0.0, 0.8),
        ];
        DetectionResult {
            skeletons: vec![skeleton.clone(), skeleton],
            boxes: vec![BoundingBox::new(0.5, 0.5, 0.2, 0.4)],
            sequence: 5,
            mask: None,
        }
    }

    fn addresses(packet: &OscPacket) -> Vec<String> {
        match packet {
            OscPacket::Message(msg) => vec![msg.addr.clone()],
            OscPacket::Bundle(bundle) => bundle.content.iter().flat_map(addresses).collect(),
        }
    }

    #[test]
    fn bundle_mode_addresses_every_subject_and_landmark() {
        let packets = frame_packets(&two_subjects(), &context(2), OscMode::Bundle);
        assert_eq!(packets.len(), 1, "no metadata on frame 2");
        assert_eq!(
            addresses(&packets[0]),
            vec![
                "/pose/p1/0",
                "/pose/p1/1",
                "/pose/p1/bbox",
                "/pose/p2/0",
                "/pose/p2/1",
            ]
        );
    }

    #[test]
    fn bbox_is_sent_as_centre_and_size() {
        let packets = frame_packets(&two_subjects(), &context(2), OscMode::Bundle);
        let OscPacket::Bundle(bundle) = &packets[0] else {
            panic!("expected a bundle");
        };
        let bbox = bundle
            .content
            .iter()
            .find_map(|packet| match packet {
                OscPacket::Message(msg) if msg.addr == "/pose/p1/bbox" => Some(msg.args.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            bbox,
            vec![
                OscType::Float(0.5),
                OscType::Float(0.5),
                OscType::Float(0.2),
                OscType::Float(0.4),
            ]
        );
    }

    #[test]
    fn metadata_on_first_frame_and_every_fps_frames() {
        for (frame, expected) in [(1, true), (2, false), (30, true), (31, false), (60, true)] {
            let packets = frame_packets(&DetectionResult::default(), &context(frame), OscMode::Bundle);
            assert_eq!(packets.len() == 1, expected, "frame {frame}");
        }

        let packets = frame_packets(&two_subjects(), &context(1), OscMode::Bundle);
        let meta = addresses(&packets[0]);
        assert!(meta.contains(&"/framecount".to_string()));
        assert!(meta.contains(&"/landmarks".to_string()));
    }

    #[test]
    fn legacy_mode_uses_landmark_names_for_first_subject() {
        let packets = frame_packets(&two_subjects(), &context(2), OscMode::Legacy);
        let all: Vec<String> = packets.iter().flat_map(addresses).collect();
        assert_eq!(all, vec!["/p1/nose", "/p1/eye_l", "/numLandmarks"]);
    }

    #[test]
    fn packets_encode() {
        for packet in frame_packets(&two_subjects(), &context(1), OscMode::Bundle) {
            assert!(rosc::encoder::encode(&packet).is_ok());
        }
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!("Legacy".parse::<OscMode>().unwrap(), OscMode::Legacy);
        assert!("csv".parse::<OscMode>().is_err());
    }
}
