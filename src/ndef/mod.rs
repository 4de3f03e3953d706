//! NDEF message decoding for proximity tags.
//!
//! A raw tag payload is a sequence of typed records. We only ever need the
//! human-readable text carried by a tag, so the public surface is
//! [`extract_text`]: parse whatever records are present, pull text out of
//! the ones we understand, and join them with newlines. Anything that goes
//! wrong (truncated payload, malformed length byte, unknown structure)
//! collapses to "no message"; a bad tag must never produce an error that
//! escapes the scan handler.

use anyhow::{bail, Result};

const TNF_MASK: u8 = 0x07;
const FLAG_SHORT_RECORD: u8 = 0x10;
const FLAG_ID_LENGTH: u8 = 0x08;

const TNF_WELL_KNOWN: u8 = 0x01;
const TNF_MIME_MEDIA: u8 = 0x02;
const TNF_ABSOLUTE_URI: u8 = 0x03;

/// RTD abbreviation table for well-known URI records. The first payload
/// byte indexes into this table; index 0 means "no abbreviation".
const URI_PREFIXES: [&str; 36] = [
    "",
    "http://www.",
    "https://www.",
    "http://",
    "https://",
    "tel:",
    "mailto:",
    "ftp://anonymous:anonymous@",
    "ftp://ftp.",
    "ftps://",
    "sftp://",
    "smb://",
    "nfs://",
    "ftp://",
    "dav://",
    "news:",
    "telnet://",
    "imap:",
    "rtsp://",
    "urn:",
    "pop:",
    "sip:",
    "sips:",
    "tftp:",
    "btspp://",
    "btl2cap://",
    "btgoep://",
    "tcpobex://",
    "irdaobex://",
    "file://",
    "urn:epc:id:",
    "urn:epc:tag:",
    "urn:epc:pat:",
    "urn:epc:raw:",
    "urn:epc:",
    "urn:nfc:",
];

/// One record of an NDEF message, classified by type.
///
/// The record space is closed for our purposes: every consumption site
/// matches exhaustively and `Unsupported` soaks up the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagRecord {
    /// Well-known text record (`T`).
    Text { language: String, text: String },
    /// Well-known URI record (`U`), prefix already expanded.
    Uri { uri: String },
    /// Absolute-URI record; the URI lives in the type field.
    AbsoluteUri { uri: String },
    /// Opaque MIME payload, decoded as UTF-8 text.
    Mime { media_type: String, text: String },
    /// Anything we do not understand; contributes no text.
    Unsupported,
}

impl TagRecord {
    /// Text contribution of this record, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            TagRecord::Text { text, .. } => Some(text),
            TagRecord::Uri { uri } => Some(uri),
            TagRecord::AbsoluteUri { uri } => Some(uri),
            TagRecord::Mime { text, .. } => Some(text),
            TagRecord::Unsupported => None,
        }
    }
}

/// Decode a full NDEF message into its records.
///
/// Errors describe where the byte stream went wrong; callers that only
/// care about "message or no message" should use [`extract_text`].
pub fn parse_message(bytes: &[u8]) -> Result<Vec<TagRecord>> {
    if bytes.is_empty() {
        bail!("empty NDEF message");
    }

    let mut records = Vec::new();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let (record, next) = parse_record(bytes, pos)?;
        records.push(record);
        pos = next;
    }

    Ok(records)
}

/// Extract the joined text of all decodable records, or `None`.
///
/// Records that decode but carry no supported text are skipped; if the
/// message yields no text at all, or fails to parse, the whole scan reads
/// as "no message".
pub fn extract_text(bytes: &[u8]) -> Option<String> {
    let records = parse_message(bytes).ok()?;

    let texts: Vec<&str> = records.iter().filter_map(TagRecord::text).collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    }
}

fn parse_record(bytes: &[u8], start: usize) -> Result<(TagRecord, usize)> {
    let header = bytes[start];
    let tnf = header & TNF_MASK;
    let short_record = header & FLAG_SHORT_RECORD != 0;
    let has_id = header & FLAG_ID_LENGTH != 0;

    let mut pos = start + 1;

    let type_len = read_u8(bytes, &mut pos)? as usize;
    let payload_len = if short_record {
        read_u8(bytes, &mut pos)? as usize
    } else {
        read_u32(bytes, &mut pos)? as usize
    };
    let id_len = if has_id {
        read_u8(bytes, &mut pos)? as usize
    } else {
        0
    };

    let type_field = read_slice(bytes, &mut pos, type_len)?;
    let _id = read_slice(bytes, &mut pos, id_len)?;
    let payload = read_slice(bytes, &mut pos, payload_len)?;

    let record = match tnf {
        TNF_WELL_KNOWN if type_field == b"T" => parse_text_record(payload),
        TNF_WELL_KNOWN if type_field == b"U" => parse_uri_record(payload),
        TNF_ABSOLUTE_URI => match std::str::from_utf8(type_field) {
            Ok(uri) => TagRecord::AbsoluteUri {
                uri: uri.to_string(),
            },
            Err(_) => TagRecord::Unsupported,
        },
        TNF_MIME_MEDIA => {
            match (
                std::str::from_utf8(type_field),
                std::str::from_utf8(payload),
            ) {
                (Ok(media_type), Ok(text)) => TagRecord::Mime {
                    media_type: media_type.to_string(),
                    text: text.to_string(),
                },
                _ => TagRecord::Unsupported,
            }
        }
        _ => TagRecord::Unsupported,
    };

    Ok((record, pos))
}

/// Well-known text record: status byte (low 6 bits = language-code
/// length), language code, then UTF-8 text.
fn parse_text_record(payload: &[u8]) -> TagRecord {
    let Some(&status) = payload.first() else {
        return TagRecord::Unsupported;
    };
    let lang_len = (status & 0x3F) as usize;
    if payload.len() < 1 + lang_len {
        return TagRecord::Unsupported;
    }

    let language = match std::str::from_utf8(&payload[1..1 + lang_len]) {
        Ok(lang) => lang.to_string(),
        Err(_) => return TagRecord::Unsupported,
    };
    match std::str::from_utf8(&payload[1 + lang_len..]) {
        Ok(text) => TagRecord::Text {
            language,
            text: text.to_string(),
        },
        Err(_) => TagRecord::Unsupported,
    }
}

/// Well-known URI record: prefix-table index byte, then the URI remainder.
fn parse_uri_record(payload: &[u8]) -> TagRecord {
    let Some(&prefix_index) = payload.first() else {
        return TagRecord::Unsupported;
    };
    let Some(prefix) = URI_PREFIXES.get(prefix_index as usize) else {
        return TagRecord::Unsupported;
    };
    match std::str::from_utf8(&payload[1..]) {
        Ok(rest) => TagRecord::Uri {
            uri: format!("{prefix}{rest}"),
        },
        Err(_) => TagRecord::Unsupported,
    }
}

fn read_u8(bytes: &[u8], pos: &mut usize) -> Result<u8> {
    let Some(&value) = bytes.get(*pos) else {
        bail!("NDEF record truncated at offset {}", *pos);
    };
    *pos += 1;
    Ok(value)
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Result<u32> {
    let end = *pos + 4;
    let Some(slice) = bytes.get(*pos..end) else {
        bail!("NDEF record truncated at offset {}", *pos);
    };
    *pos = end;
    Ok(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn read_slice<'a>(bytes: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos.checked_add(len).filter(|&end| end <= bytes.len());
    let Some(end) = end else {
        bail!(
            "NDEF record claims {} bytes at offset {} but only {} remain",
            len,
            *pos,
            bytes.len() - *pos
        );
    };
    let slice = &bytes[*pos..end];
    *pos = end;
    Ok(slice)
}
