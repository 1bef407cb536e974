use bytes::{Bytes, BytesMut};
use peerlane::codec::{encode_envelope, EnvelopeHeader, RemoteMetadata, TableRefs};
use peerlane::compress::{ActorRefPath, ClassManifest, Compressible, CompressionTable};
use serde::Serialize;

use crate::cmd::{parse_hex, EncodeArgs};
use crate::exit::{codec_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{new_table, print_json, print_raw, OutputFormat};

#[derive(Serialize)]
struct EncodeOutput {
    size: usize,
    actor_ref_table_version: u8,
    manifest_table_version: u8,
    compressed: Vec<&'static str>,
    hex: String,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = match (&args.data, &args.hex_payload) {
        (Some(text), _) => text.as_bytes().to_vec(),
        (None, Some(hex)) => parse_hex(hex)?,
        (None, None) => Vec::new(),
    };

    let header = EnvelopeHeader {
        version: args.protocol_version,
        origin_uid: args.origin_uid,
        serializer_id: args.serializer_id,
        sender: args.sender.as_deref().map(ActorRefPath::from),
        recipient: args.recipient.as_deref().map(ActorRefPath::from),
        manifest: args.manifest.clone(),
        metadata: parse_metadata(&args.metadata)?,
    };

    let actor_refs: CompressionTable<ActorRefPath> = advertised_table(
        args.origin_uid,
        args.table_version,
        args.actor_refs.iter().map(|path| ActorRefPath::from(path.as_str())),
    );
    let manifests: CompressionTable<ClassManifest> =
        advertised_table(args.origin_uid, args.table_version, args.manifests.clone());

    let mut frame = BytesMut::new();
    encode_envelope(
        &header,
        &payload,
        TableRefs {
            actor_refs: &actor_refs,
            manifests: &manifests,
        },
        args.max_frame_size,
        &mut frame,
    )
    .map_err(|err| codec_error("encode failed", err))?;

    if let OutputFormat::Raw = format {
        print_raw(&frame);
        return Ok(SUCCESS);
    }

    let mut compressed = Vec::new();
    if header
        .sender
        .as_ref()
        .is_some_and(|sender| actor_refs.compress(sender).is_some())
    {
        compressed.push("sender");
    }
    if header
        .recipient
        .as_ref()
        .is_some_and(|recipient| actor_refs.compress(recipient).is_some())
    {
        compressed.push("recipient");
    }
    if manifests.compress(&header.manifest).is_some() {
        compressed.push("manifest");
    }

    let out = EncodeOutput {
        size: frame.len(),
        actor_ref_table_version: actor_refs.version(),
        manifest_table_version: manifests.version(),
        compressed,
        hex: hex::encode(&frame),
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["SIZE", "COMPRESSED", "HEX"]);
            table.add_row(vec![
                out.size.to_string(),
                out.compressed.join(","),
                out.hex.clone(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => println!("{}", out.hex),
    }
    Ok(SUCCESS)
}

/// An empty version-0 table when nothing was advertised.
fn advertised_table<T: Compressible>(
    origin_uid: u64,
    version: u8,
    values: impl IntoIterator<Item = T>,
) -> CompressionTable<T> {
    let table = CompressionTable::new(origin_uid, version, values);
    if table.is_empty() {
        CompressionTable::empty(origin_uid, 0)
    } else {
        table
    }
}

fn parse_metadata(entries: &[String]) -> CliResult<Option<RemoteMetadata>> {
    if entries.is_empty() {
        return Ok(None);
    }
    let mut metadata = RemoteMetadata::new();
    for entry in entries {
        let (id, text) = entry.split_once('=').ok_or_else(|| {
            CliError::new(USAGE, format!("metadata entry {entry:?} is not ID=TEXT"))
        })?;
        let id: u8 = id.trim().parse().map_err(|_| {
            CliError::new(USAGE, format!("metadata id {id:?} is not in 0..=255"))
        })?;
        metadata.insert(id, Bytes::copy_from_slice(text.as_bytes()));
    }
    Ok(Some(metadata))
}
