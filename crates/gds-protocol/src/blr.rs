//! BLR message format generation.
//!
//! Execute and fetch requests describe their message layout with a short
//! BLR program: one `blr_message` whose fields are the column values each
//! followed by a SMALLINT null indicator.

use bytes::Bytes;

use crate::descriptor::ColumnDescriptor;
use crate::error::ProtocolError;
use crate::isc::blr;
use crate::types::ColumnKind;

/// Build the message BLR for a descriptor list.
///
/// An empty list yields an empty buffer, which the server accepts as
/// "no message".
pub fn build_message_blr(vars: &[ColumnDescriptor]) -> Result<Bytes, ProtocolError> {
    if vars.is_empty() {
        return Ok(Bytes::new());
    }

    let par_count = vars.len() * 2;
    if par_count > usize::from(u16::MAX) {
        return Err(ProtocolError::ValueTooLarge("BLR parameter count"));
    }

    let mut out = Vec::with_capacity(8 + vars.len() * 6);
    out.extend_from_slice(&[blr::VERSION5, blr::BEGIN, blr::MESSAGE, 0]);
    out.push((par_count & 0xFF) as u8);
    out.push((par_count >> 8) as u8);

    for var in vars {
        let kind = var.kind()?;
        out.push(kind.blr_code());
        match kind {
            ColumnKind::Text | ColumnKind::Varying | ColumnKind::Null => {
                let len = var.length.max(0);
                out.push((len & 0xFF) as u8);
                out.push(((len >> 8) & 0xFF) as u8);
            }
            ColumnKind::Short | ColumnKind::Long | ColumnKind::Int64 | ColumnKind::Quad => {
                out.push(var.scale as u8);
            }
            ColumnKind::Blob | ColumnKind::Array => out.push(0),
            _ => {}
        }
        out.extend_from_slice(&[blr::SHORT, 0]);
    }

    out.extend_from_slice(&[blr::END, blr::EOC]);
    Ok(Bytes::from(out))
}
