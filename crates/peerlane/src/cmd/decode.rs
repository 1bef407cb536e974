use std::fmt;
use std::io::Read;

use bytes::Bytes;
use peerlane::codec::{decode_envelope, DecodedEnvelope, FieldRef};
use serde::Serialize;

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{codec_error, io_error, CliResult, SUCCESS};
use crate::output::{new_table, payload_preview, print_json, print_raw, OutputFormat};

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum FieldOutput {
    Literal { value: String },
    Compressed { code: u32 },
    Absent,
}

impl From<&FieldRef> for FieldOutput {
    fn from(field: &FieldRef) -> Self {
        match field {
            FieldRef::Literal(value) => FieldOutput::Literal {
                value: value.clone(),
            },
            FieldRef::Compressed(code) => FieldOutput::Compressed { code: *code },
            FieldRef::Absent => FieldOutput::Absent,
        }
    }
}

impl fmt::Display for FieldOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldOutput::Literal { value } => f.write_str(value),
            FieldOutput::Compressed { code } => write!(f, "#{code}"),
            FieldOutput::Absent => f.write_str("-"),
        }
    }
}

#[derive(Serialize)]
struct MetadataOutput {
    instrument_id: u8,
    size: usize,
    data_hex: String,
}

#[derive(Serialize)]
struct DecodeOutput {
    version: u8,
    flags: u8,
    origin_uid: u64,
    serializer_id: i32,
    actor_ref_table_version: u8,
    manifest_table_version: u8,
    sender: FieldOutput,
    recipient: FieldOutput,
    manifest: FieldOutput,
    metadata: Vec<MetadataOutput>,
    payload_size: usize,
    payload: String,
}

impl From<&DecodedEnvelope> for DecodeOutput {
    fn from(decoded: &DecodedEnvelope) -> Self {
        let metadata = decoded
            .metadata
            .as_ref()
            .map(|metadata| {
                metadata
                    .entries()
                    .iter()
                    .map(|entry| MetadataOutput {
                        instrument_id: entry.instrument_id,
                        size: entry.data.len(),
                        data_hex: hex::encode(&entry.data),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            version: decoded.version,
            flags: decoded.flags,
            origin_uid: decoded.origin_uid,
            serializer_id: decoded.serializer_id,
            actor_ref_table_version: decoded.actor_ref_table_version,
            manifest_table_version: decoded.manifest_table_version,
            sender: FieldOutput::from(&decoded.sender),
            recipient: FieldOutput::from(&decoded.recipient),
            manifest: FieldOutput::from(&decoded.manifest),
            metadata,
            payload_size: decoded.payload.len(),
            payload: payload_preview(&decoded.payload),
        }
    }
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let frame = Bytes::from(read_frame(&args)?);
    let decoded = decode_envelope(&frame, args.highest_version)
        .map_err(|err| codec_error("decode failed", err))?;

    if let OutputFormat::Raw = format {
        print_raw(&decoded.payload);
        return Ok(SUCCESS);
    }

    let out = DecodeOutput::from(&decoded);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["FIELD", "VALUE"]);
            for (field, value) in rows(&out) {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for (field, value) in rows(&out) {
                println!("{field:<24} {value}");
            }
        }
    }
    Ok(SUCCESS)
}

fn rows(out: &DecodeOutput) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("version", out.version.to_string()),
        ("flags", format!("{:#04x}", out.flags)),
        ("origin_uid", out.origin_uid.to_string()),
        ("serializer_id", out.serializer_id.to_string()),
        ("actor_ref_table_version", out.actor_ref_table_version.to_string()),
        ("manifest_table_version", out.manifest_table_version.to_string()),
        ("sender", out.sender.to_string()),
        ("recipient", out.recipient.to_string()),
        ("manifest", out.manifest.to_string()),
    ];
    for entry in &out.metadata {
        rows.push((
            "metadata",
            format!("{} ({} bytes): {}", entry.instrument_id, entry.size, entry.data_hex),
        ));
    }
    rows.push(("payload_size", out.payload_size.to_string()));
    rows.push(("payload", out.payload.clone()));
    rows
}

fn read_frame(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(text) = &args.hex {
        return parse_hex(text);
    }
    if let Some(path) = &args.file {
        return std::fs::read(path)
            .map_err(|err| io_error(&format!("failed to read {}", path.display()), err));
    }
    let mut frame = Vec::new();
    std::io::stdin()
        .read_to_end(&mut frame)
        .map_err(|err| io_error("failed to read stdin", err))?;
    Ok(frame)
}
