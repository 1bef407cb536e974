use bytes::Bytes;
use peerlane::association::{AssociationRegistry, ControlMessage, ControlOutcome, LaneId, Settings};
use peerlane::codec::{
    decode_envelope, EnvelopeDecoder, EnvelopeEncoder, OutboundEnvelope, SerializedMessage,
};
use peerlane::compress::ActorRefPath;
use peerlane::primitives::Address;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cmd::config::load_settings;
use crate::cmd::SimulateArgs;
use crate::exit::{
    association_error, codec_error, settings_error, CliError, CliResult, FAILURE, SUCCESS, USAGE,
};
use crate::output::{new_table, print_json, OutputFormat};

const SENDER_UID: u64 = 1;
const RECEIVER_UID: u64 = 2;
const SIMULATION_SERIALIZER_ID: i32 = 4;

/// One in-process system: its associations plus the codec halves of its
/// single stream.
struct Node {
    registry: AssociationRegistry,
    encoder: EnvelopeEncoder,
    decoder: EnvelopeDecoder,
}

impl Node {
    fn new(base: &Settings, port: u32, uid: u64) -> Self {
        let mut settings = base.clone();
        settings.canonical.hostname = "127.0.0.1".to_string();
        settings.canonical.port = port;
        let registry = AssociationRegistry::new(settings.unique_address(uid), settings);
        let encoder = registry.new_encoder();
        let decoder = registry.new_decoder();
        Self {
            registry,
            encoder,
            decoder,
        }
    }

    fn address(&self) -> Address {
        self.registry.local().address.clone()
    }

    fn encode_lane(&self, to: &Address, lane: LaneId) -> CliResult<Vec<Bytes>> {
        let association = self.registry.association(to);
        let mut frames = Vec::new();
        while let Some(envelope) = association.lanes().poll(lane) {
            let frame = self
                .encoder
                .encode(&envelope, association.outbound_compressions())
                .map_err(|err| codec_error("encode failed", err))?;
            frames.push(frame.freeze());
        }
        Ok(frames)
    }
}

#[derive(Debug, Default, Serialize)]
struct RoundReport {
    round: usize,
    frames: usize,
    bytes: usize,
    dropped: usize,
    compressed_fields: usize,
    unavailable_fields: usize,
    actor_ref_table_version: u8,
    manifest_table_version: u8,
    advertisements: Vec<String>,
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    if args.recipients.is_empty() {
        return Err(CliError::new(USAGE, "at least one recipient is required"));
    }
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(interval) = args.sample_interval {
        settings.compression.hit_sample_interval = interval;
    }
    settings
        .validate()
        .map_err(|err| settings_error("invalid simulation settings", err))?;

    let port = settings.canonical.port;
    let receiver_port = if port < u32::from(u16::MAX) {
        port + 1
    } else {
        port - 1
    };
    let mut sender = Node::new(&settings, port, SENDER_UID);
    let mut receiver = Node::new(&settings, receiver_port, RECEIVER_UID);
    handshake(&mut sender, &mut receiver)?;

    let reports = (1..=args.rounds)
        .map(|round| run_round(round, &args, &mut sender, &mut receiver))
        .collect::<CliResult<Vec<_>>>()?;

    match format {
        OutputFormat::Json => print_json(&reports),
        OutputFormat::Table => {
            let mut table = new_table(vec![
                "ROUND",
                "FRAMES",
                "BYTES",
                "COMPRESSED",
                "UNAVAILABLE",
                "TABLES",
                "ADVERTISEMENTS",
            ]);
            for report in &reports {
                table.add_row(vec![
                    report.round.to_string(),
                    report.frames.to_string(),
                    report.bytes.to_string(),
                    report.compressed_fields.to_string(),
                    report.unavailable_fields.to_string(),
                    format!(
                        "{}/{}",
                        report.actor_ref_table_version, report.manifest_table_version
                    ),
                    report.advertisements.join("\n"),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for report in &reports {
                println!(
                    "round {}: {} frames, {} bytes, {} compressed, {} unavailable, tables {}/{}",
                    report.round,
                    report.frames,
                    report.bytes,
                    report.compressed_fields,
                    report.unavailable_fields,
                    report.actor_ref_table_version,
                    report.manifest_table_version,
                );
                for advertisement in &report.advertisements {
                    println!("  {advertisement}");
                }
            }
        }
    }
    Ok(SUCCESS)
}

fn handshake(sender: &mut Node, receiver: &mut Node) -> CliResult<()> {
    let request = ControlMessage::HandshakeReq {
        from: sender.registry.local().clone(),
        to: receiver.address(),
    };
    sender
        .registry
        .association(&receiver.address())
        .send_control(&request)
        .map_err(|err| association_error("handshake request failed", err))?;

    deliver_control(sender, receiver)?;
    deliver_control(receiver, sender)?;

    let outbound = sender.registry.association(&receiver.address());
    if outbound.associated_with().is_none() {
        return Err(CliError::new(FAILURE, "handshake did not complete"));
    }
    outbound.set_ordinary_stream_active(true);
    if let Some(inbound) = receiver.registry.association_by_uid(SENDER_UID) {
        inbound.set_ordinary_stream_active(true);
    }
    info!(from = %sender.address(), to = %receiver.address(), "simulated association established");
    Ok(())
}

fn deliver_control(from: &Node, to: &mut Node) -> CliResult<Vec<ControlOutcome>> {
    let frames = from.encode_lane(&to.address(), LaneId::Control)?;
    let mut outcomes = Vec::with_capacity(frames.len());
    for frame in frames {
        let outcome = to
            .registry
            .receive_control_frame(&frame, &mut to.decoder)
            .map_err(|err| association_error("control message failed", err))?;
        debug!(?outcome, to = %to.address(), "control message handled");
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

fn run_round(
    round: usize,
    args: &SimulateArgs,
    sender: &mut Node,
    receiver: &mut Node,
) -> CliResult<RoundReport> {
    let mut report = RoundReport {
        round,
        ..RoundReport::default()
    };
    let to = receiver.address();
    let outbound = sender.registry.association(&to);

    for recipient in args.recipients.iter().cycle().take(args.messages) {
        let envelope = OutboundEnvelope::new(
            Some(ActorRefPath::from(recipient.as_str())),
            SerializedMessage::new(
                SIMULATION_SERIALIZER_ID,
                args.manifest.as_str(),
                Bytes::from_static(b"ping"),
            ),
        );
        if let Err(dropped) = outbound.send(envelope) {
            warn!(reason = ?dropped.reason, "simulated message dropped");
            report.dropped += 1;
        }
    }

    let highest_version = receiver.registry.settings().protocol.highest_supported_version;
    let lanes: Vec<LaneId> = outbound
        .lanes()
        .lane_ids()
        .filter(|lane| *lane != LaneId::Control)
        .collect();
    for lane in lanes {
        for frame in sender.encode_lane(&to, lane)? {
            report.frames += 1;
            report.bytes += frame.len();

            let raw = decode_envelope(&frame, highest_version)
                .map_err(|err| codec_error("decode failed", err))?;
            report.compressed_fields += [&raw.sender, &raw.recipient, &raw.manifest]
                .iter()
                .filter(|field| field.is_compressed())
                .count();

            let inbound = receiver
                .decoder
                .decode(&frame, &receiver.registry)
                .map_err(|err| codec_error("decode failed", err))?;
            report.unavailable_fields += usize::from(inbound.sender.is_unavailable())
                + usize::from(inbound.recipient.is_unavailable())
                + usize::from(inbound.manifest.is_unavailable());
        }
    }

    let compressions = outbound.outbound_compressions();
    report.actor_ref_table_version = compressions.actor_ref_table().version();
    report.manifest_table_version = compressions.manifest_table().version();

    for (uid, outcome) in receiver
        .decoder
        .run_next_actor_ref_advertisement(&receiver.registry)
    {
        report
            .advertisements
            .push(format!("actor-ref uid {uid}: {outcome:?}"));
    }
    for (uid, outcome) in receiver
        .decoder
        .run_next_manifest_advertisement(&receiver.registry)
    {
        report
            .advertisements
            .push(format!("manifest uid {uid}: {outcome:?}"));
    }

    deliver_control(receiver, sender)?;
    deliver_control(sender, receiver)?;
    Ok(report)
}
