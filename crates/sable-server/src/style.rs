//! Parsed stylesheet payloads.
//!
//! A stylesheet payload is not one flat blob: the server stores the
//! source text as a raw block and next to it a relocatable vector of
//! rule spans, so clients walk individual rules without re-tokenising
//! the sheet. The payload reference handed across the session is the
//! vector's control block.
//!
//! Layout of a `StyleRules` payload:
//!
//! - `payload.data` → [`RelVec<RuleSpan>`] control block
//! - element 0: blob descriptor — `start` is the region offset of the
//!   text block, `len` its byte length
//! - elements 1..: one span per rule, `start` relative to the text
//!   block

use sable_arena::{ArenaError, RegionMap};
use sable_core::{PayloadFormat, Region, Relocatable, SharedPayload};
use sable_relvec::RelVec;

/// One rule's position, or (as element 0) the text blob descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuleSpan {
    /// Byte start. Region-absolute for element 0, blob-relative after.
    pub start: u32,
    /// Byte length.
    pub len: u32,
}

impl Relocatable for RuleSpan {
    const SIZE: usize = 8;

    fn write_to(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.start.to_le_bytes());
        out[4..8].copy_from_slice(&self.len.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            start: u32::from_le_bytes(buf[0..4].try_into().expect("span start field")),
            len: u32::from_le_bytes(buf[4..8].try_into().expect("span len field")),
        }
    }
}

/// Split `text` into rule spans: each span covers one rule up to and
/// including its closing brace, with leading whitespace trimmed. Text
/// after the last closing brace is an incomplete rule and is dropped.
fn rule_spans(text: &[u8]) -> Vec<RuleSpan> {
    let mut spans = Vec::new();
    let mut cursor = 0usize;
    for (i, &b) in text.iter().enumerate() {
        if b != b'}' {
            continue;
        }
        let chunk = &text[cursor..=i];
        let lead = chunk
            .iter()
            .take_while(|c| c.is_ascii_whitespace())
            .count();
        if lead < chunk.len() {
            spans.push(RuleSpan {
                start: (cursor + lead) as u32,
                len: (chunk.len() - lead) as u32,
            });
        }
        cursor = i + 1;
    }
    spans
}

/// Parse `source` into the arena: text blob plus rule-span vector.
///
/// On any allocation failure everything built so far is rolled back —
/// the caller never sees a half-initialised payload.
pub fn build_style_payload(
    ctx: &RegionMap,
    region: Region,
    source: &[u8],
) -> Result<SharedPayload, ArenaError> {
    let text_len = source.len() as u32;
    let blob = ctx.alloc(region, text_len.max(1))?;
    ctx.write_bytes(region, blob, source)?;

    let spans = rule_spans(source);
    let mut vec = match RelVec::<RuleSpan>::with_capacity_in(ctx, region, spans.len() as u32 + 1) {
        Ok(vec) => vec,
        Err(e) => {
            ctx.free(region, blob)?;
            return Err(e);
        }
    };
    let header = RuleSpan {
        start: blob,
        len: text_len,
    };
    let mut push_all = || -> Result<(), ArenaError> {
        vec.push(ctx, &header)?;
        for span in &spans {
            vec.push(ctx, span)?;
        }
        Ok(())
    };
    if let Err(e) = push_all() {
        vec.dispose(ctx)?;
        ctx.free(region, blob)?;
        return Err(e);
    }

    Ok(SharedPayload {
        data: vec.shared_ref(),
        len: text_len + (spans.len() as u32 + 1) * RuleSpan::SIZE as u32,
        format: PayloadFormat::StyleRules,
    })
}

/// Read the rules of a `StyleRules` payload, in sheet order.
///
/// This is the client path: the vector is traversed through a foreign
/// handle and nothing is written.
pub fn read_style_rules(
    ctx: &RegionMap,
    payload: &SharedPayload,
) -> Result<Vec<String>, ArenaError> {
    debug_assert_eq!(payload.format, PayloadFormat::StyleRules);
    let vec = RelVec::<RuleSpan>::from_shared(payload.data);
    let region = payload.data.region();
    let count = vec.len(ctx)?;
    let mut rules = Vec::new();
    if count == 0 {
        return Ok(rules);
    }
    let blob = vec.get(ctx, 0)?;
    for i in 1..count {
        let span = vec.get(ctx, i)?;
        let bytes = ctx.read_bytes(region, blob.start + span.start, span.len)?;
        rules.push(String::from_utf8_lossy(&bytes).into_owned());
    }
    Ok(rules)
}

/// Release a `StyleRules` payload: the text blob and the span vector.
pub(crate) fn free_style_payload(
    ctx: &RegionMap,
    payload: &SharedPayload,
) -> Result<(), ArenaError> {
    let vec = RelVec::<RuleSpan>::adopt(payload.data);
    let blob = vec.get(ctx, 0)?;
    ctx.free(payload.data.region(), blob.start)?;
    vec.dispose(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_arena::ChunkConfig;

    fn ctx() -> RegionMap {
        RegionMap::server(
            &ChunkConfig::with_size(1 << 16),
            &ChunkConfig::with_size(4096),
        )
    }

    const SHEET: &[u8] = b"button { border: 1px; }\n\nlabel {\n  color: red;\n}\ntrailing garbage";

    #[test]
    fn spans_cover_each_rule() {
        let spans = rule_spans(SHEET);
        assert_eq!(spans.len(), 2);
        let first = &SHEET[spans[0].start as usize..][..spans[0].len as usize];
        assert_eq!(first, b"button { border: 1px; }");
        let second = &SHEET[spans[1].start as usize..][..spans[1].len as usize];
        assert_eq!(second, b"label {\n  color: red;\n}");
    }

    #[test]
    fn build_then_read_round_trips_rules() {
        let ctx = ctx();
        let payload = build_style_payload(&ctx, Region::Shared, SHEET).unwrap();
        assert_eq!(payload.format, PayloadFormat::StyleRules);
        let rules = read_style_rules(&ctx, &payload).unwrap();
        assert_eq!(
            rules,
            vec![
                "button { border: 1px; }".to_string(),
                "label {\n  color: red;\n}".to_string(),
            ]
        );
        free_style_payload(&ctx, &payload).unwrap();
    }

    #[test]
    fn client_mapping_reads_the_same_rules() {
        let server = ctx();
        let payload = build_style_payload(&server, Region::Shared, SHEET).unwrap();
        let client = RegionMap::client(
            server.share().unwrap(),
            &ChunkConfig::with_size(4096),
        );
        let via_client = read_style_rules(&client, &payload).unwrap();
        let via_server = read_style_rules(&server, &payload).unwrap();
        assert_eq!(via_client, via_server);
        free_style_payload(&server, &payload).unwrap();
    }

    #[test]
    fn empty_sheet_builds_and_frees() {
        let ctx = ctx();
        let payload = build_style_payload(&ctx, Region::Shared, b"").unwrap();
        assert!(read_style_rules(&ctx, &payload).unwrap().is_empty());
        free_style_payload(&ctx, &payload).unwrap();
    }

    #[test]
    fn repeated_build_free_cycles_do_not_leak() {
        let ctx = ctx();
        // Warm-up carves the small-block slabs, which stay with their
        // pools by design; steady state must then be leak-free.
        let payload = build_style_payload(&ctx, Region::Shared, SHEET).unwrap();
        free_style_payload(&ctx, &payload).unwrap();
        let steady = ctx.free_bytes(Region::Shared).unwrap();
        for _ in 0..16 {
            let payload = build_style_payload(&ctx, Region::Shared, SHEET).unwrap();
            free_style_payload(&ctx, &payload).unwrap();
        }
        assert_eq!(ctx.free_bytes(Region::Shared).unwrap(), steady);
    }
}
