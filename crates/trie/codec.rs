//! Deterministic byte (de)serialisation of vertices, filters, the id
//! generator, and the journal scheduler state.
//!
//! Every blob is self-describing via a leading type tag:
//!
//! ```text
//! 0x01  leaf vertex       tag | hp-len u8 | hex-prefix | payload
//! 0x02  extension vertex  tag | hp-len u8 | hex-prefix | child u64
//! 0x03  branch vertex     tag | bitmap u16 | child u64 per set bit
//! 0x40  id generator      tag | count u32 | id u64 ...
//! 0x41  filter            tag | src | trg | vgen | sTab | kMap
//! 0x42  scheduler state   tag | tiers u8 | per tier: serial u64,
//!                         count u32, (qid, fid_lo, fid_hi) u64 triples
//! ```
//!
//! Payloads carry their own sub-tag (0x10 raw, 0x11 account, 0x12 storage).
//! Merkle keys serialise as a length byte followed by 0 (void), 1..=31
//! (embedded) or 32 (hash) bytes.

use ethereum_types::{H256, U256};

use crate::errors::{err, ErrorKind, Result, TrieError};
use crate::filter::Filter;
use crate::journal::{JournalState, TierState};
use crate::nibbles::Nibbles;
use crate::vertex::{AccountPayload, HashKey, Payload, Vertex};
use crate::vid::VertexId;

const TAG_LEAF: u8 = 0x01;
const TAG_EXT: u8 = 0x02;
const TAG_BRANCH: u8 = 0x03;
const TAG_IDG: u8 = 0x40;
const TAG_FILTER: u8 = 0x41;
const TAG_FQS: u8 = 0x42;

const TAG_PAYLOAD_RAW: u8 = 0x10;
const TAG_PAYLOAD_ACCOUNT: u8 = 0x11;
const TAG_PAYLOAD_STORAGE: u8 = 0x12;

/// Longest nibble path a vertex prefix may carry.
const MAX_PFX_NIBBLES: usize = 64;
/// Upper bound on a single filter record, keeping garbled length fields from
/// driving huge allocations.
const MAX_RECORD_BYTES: usize = 1 << 20;

// -- encoding ---------------------------------------------------------------

pub fn encode_vertex(vtx: &Vertex) -> Result<Vec<u8>> {
    let mut blob = Vec::with_capacity(64);
    match vtx {
        Vertex::Leaf { pfx, payload } => {
            if pfx.len() > MAX_PFX_NIBBLES {
                return err(VertexId::NONE, ErrorKind::CodecOverflow);
            }
            blob.push(TAG_LEAF);
            let hp = pfx.encode_compact(true);
            blob.push(hp.len() as u8);
            blob.extend_from_slice(&hp);
            encode_payload(payload, &mut blob);
        }
        Vertex::Ext { pfx, vid } => {
            if pfx.is_empty() || pfx.len() > MAX_PFX_NIBBLES {
                return err(*vid, ErrorKind::CodecOverflow);
            }
            blob.push(TAG_EXT);
            let hp = pfx.encode_compact(false);
            blob.push(hp.len() as u8);
            blob.extend_from_slice(&hp);
            blob.extend_from_slice(&vid.0.to_be_bytes());
        }
        Vertex::Branch { children } => {
            blob.push(TAG_BRANCH);
            let mut bitmap = 0u16;
            for (nibble, child) in children.iter().enumerate() {
                if child.is_some() {
                    bitmap |= 1 << nibble;
                }
            }
            blob.extend_from_slice(&bitmap.to_be_bytes());
            for child in children.iter().flatten() {
                blob.extend_from_slice(&child.0.to_be_bytes());
            }
        }
    }
    Ok(blob)
}

fn encode_payload(payload: &Payload, blob: &mut Vec<u8>) {
    match payload {
        Payload::Raw(bytes) => {
            blob.push(TAG_PAYLOAD_RAW);
            blob.extend_from_slice(bytes);
        }
        Payload::Account(account) => {
            blob.push(TAG_PAYLOAD_ACCOUNT);
            blob.extend_from_slice(&account.nonce.to_be_bytes());
            blob.extend_from_slice(&account.balance.to_big_endian());
            let storage = account.storage_root.map(|vid| vid.0).unwrap_or(0);
            blob.extend_from_slice(&storage.to_be_bytes());
            blob.extend_from_slice(account.code_hash.as_bytes());
        }
        Payload::Storage(bytes) => {
            blob.push(TAG_PAYLOAD_STORAGE);
            blob.extend_from_slice(bytes);
        }
    }
}

pub fn encode_idg(state: &[VertexId]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(5 + state.len() * 8);
    blob.push(TAG_IDG);
    blob.extend_from_slice(&(state.len() as u32).to_be_bytes());
    for vid in state {
        blob.extend_from_slice(&vid.0.to_be_bytes());
    }
    blob
}

fn encode_key(key: &HashKey, blob: &mut Vec<u8>) {
    let bytes = key.as_slice();
    blob.push(bytes.len() as u8);
    blob.extend_from_slice(bytes);
}

/// Serialises a filter. Table records are emitted in ascending vertex-id
/// order so equal filters always produce equal blobs.
pub fn encode_filter(filter: &Filter) -> Result<Vec<u8>> {
    let mut blob = Vec::with_capacity(256);
    blob.push(TAG_FILTER);
    encode_key(&filter.src, &mut blob);
    encode_key(&filter.trg, &mut blob);

    blob.extend_from_slice(&(filter.vgen.len() as u32).to_be_bytes());
    for vid in &filter.vgen {
        blob.extend_from_slice(&vid.0.to_be_bytes());
    }

    let mut vids: Vec<VertexId> = filter.s_tab.keys().copied().collect();
    vids.sort_unstable();
    blob.extend_from_slice(&(vids.len() as u32).to_be_bytes());
    for vid in &vids {
        blob.extend_from_slice(&vid.0.to_be_bytes());
        match &filter.s_tab[vid] {
            Some(vtx) => {
                let vtx_blob = encode_vertex(vtx)?;
                blob.extend_from_slice(&(vtx_blob.len() as u32).to_be_bytes());
                blob.extend_from_slice(&vtx_blob);
            }
            None => blob.extend_from_slice(&0u32.to_be_bytes()),
        }
    }

    let mut vids: Vec<VertexId> = filter.k_map.keys().copied().collect();
    vids.sort_unstable();
    blob.extend_from_slice(&(vids.len() as u32).to_be_bytes());
    for vid in &vids {
        blob.extend_from_slice(&vid.0.to_be_bytes());
        encode_key(&filter.k_map[vid], &mut blob);
    }

    Ok(blob)
}

pub fn encode_journal_state(state: &JournalState) -> Vec<u8> {
    let mut blob = vec![TAG_FQS, state.tiers.len() as u8];
    for tier in &state.tiers {
        blob.extend_from_slice(&tier.serial.to_be_bytes());
        blob.extend_from_slice(&(tier.entries.len() as u32).to_be_bytes());
        for entry in &tier.entries {
            blob.extend_from_slice(&entry.qid.0.to_be_bytes());
            blob.extend_from_slice(&entry.fid_lo.0.to_be_bytes());
            blob.extend_from_slice(&entry.fid_hi.0.to_be_bytes());
        }
    }
    blob
}

// -- decoding ---------------------------------------------------------------

/// Byte cursor over a blob, turning short reads into codec errors.
struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() < n {
            return err(VertexId::NONE, ErrorKind::CodecTooShort);
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| TrieError::from(ErrorKind::CodecTooShort))?;
        Ok(u32::from_be_bytes(bytes))
    }

    fn u64(&mut self) -> Result<u64> {
        let bytes: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| TrieError::from(ErrorKind::CodecTooShort))?;
        Ok(u64::from_be_bytes(bytes))
    }

    fn rest(self) -> &'a [u8] {
        self.data
    }

    fn is_done(&self) -> bool {
        self.data.is_empty()
    }
}

fn decode_hex_prefix(reader: &mut Reader<'_>, want_leaf: bool) -> Result<Nibbles> {
    let hp_len = reader.u8()? as usize;
    if hp_len > 33 {
        return err(VertexId::NONE, ErrorKind::CodecOverflow);
    }
    let hp = reader.take(hp_len)?;
    let Some((pfx, is_leaf)) = Nibbles::decode_compact(hp) else {
        return err(VertexId::NONE, ErrorKind::CodecSizeGarbled);
    };
    if is_leaf != want_leaf || pfx.len() > MAX_PFX_NIBBLES {
        return err(VertexId::NONE, ErrorKind::CodecSizeGarbled);
    }
    Ok(pfx)
}

pub fn decode_vertex(blob: &[u8]) -> Result<Vertex> {
    let mut reader = Reader::new(blob);
    match reader.u8()? {
        TAG_LEAF => {
            let pfx = decode_hex_prefix(&mut reader, true)?;
            let payload = decode_payload(reader)?;
            Ok(Vertex::Leaf { pfx, payload })
        }
        TAG_EXT => {
            let pfx = decode_hex_prefix(&mut reader, false)?;
            if pfx.is_empty() {
                return err(VertexId::NONE, ErrorKind::CodecSizeGarbled);
            }
            let vid = VertexId(reader.u64()?);
            if !reader.is_done() {
                return err(vid, ErrorKind::CodecSizeGarbled);
            }
            if !vid.is_valid() {
                return err(vid, ErrorKind::CodecSizeGarbled);
            }
            Ok(Vertex::Ext { pfx, vid })
        }
        TAG_BRANCH => {
            let bitmap = reader.u16()?;
            if bitmap.count_ones() < 2 {
                return err(VertexId::NONE, ErrorKind::CodecSizeGarbled);
            }
            let mut children = [None; 16];
            for (nibble, slot) in children.iter_mut().enumerate() {
                if bitmap & (1 << nibble) != 0 {
                    *slot = Some(VertexId(reader.u64()?));
                }
            }
            if !reader.is_done() {
                return err(VertexId::NONE, ErrorKind::CodecSizeGarbled);
            }
            Ok(Vertex::Branch { children })
        }
        _ => err(VertexId::NONE, ErrorKind::CodecWrongType),
    }
}

fn decode_payload(mut reader: Reader<'_>) -> Result<Payload> {
    match reader.u8()? {
        TAG_PAYLOAD_RAW => Ok(Payload::Raw(reader.rest().to_vec())),
        TAG_PAYLOAD_STORAGE => Ok(Payload::Storage(reader.rest().to_vec())),
        TAG_PAYLOAD_ACCOUNT => {
            let nonce = reader.u64()?;
            let balance = U256::from_big_endian(reader.take(32)?);
            let storage = reader.u64()?;
            let code_hash = H256::from_slice(reader.take(32)?);
            if !reader.is_done() {
                return err(VertexId::NONE, ErrorKind::CodecSizeGarbled);
            }
            Ok(Payload::Account(AccountPayload {
                nonce,
                balance,
                storage_root: (storage != 0).then_some(VertexId(storage)),
                code_hash,
            }))
        }
        _ => err(VertexId::NONE, ErrorKind::CodecWrongType),
    }
}

pub fn decode_idg(blob: &[u8]) -> Result<Vec<VertexId>> {
    let mut reader = Reader::new(blob);
    if reader.u8()? != TAG_IDG {
        return err(VertexId::NONE, ErrorKind::CodecWrongType);
    }
    let count = reader.u32()? as usize;
    let mut state = Vec::with_capacity(count);
    for _ in 0..count {
        state.push(VertexId(reader.u64()?));
    }
    if !reader.is_done() {
        return err(VertexId::NONE, ErrorKind::CodecSizeGarbled);
    }
    Ok(state)
}

fn decode_key(reader: &mut Reader<'_>) -> Result<HashKey> {
    let len = reader.u8()? as usize;
    if len > 32 {
        return err(VertexId::NONE, ErrorKind::CodecOverflow);
    }
    let bytes = reader.take(len)?;
    HashKey::from_slice(bytes).ok_or_else(|| ErrorKind::CodecSizeGarbled.into())
}

pub fn decode_filter(blob: &[u8]) -> Result<Filter> {
    let mut reader = Reader::new(blob);
    if reader.u8()? != TAG_FILTER {
        return err(VertexId::NONE, ErrorKind::CodecWrongType);
    }
    let src = decode_key(&mut reader)?;
    let trg = decode_key(&mut reader)?;

    let count = reader.u32()? as usize;
    let mut vgen = Vec::with_capacity(count);
    for _ in 0..count {
        vgen.push(VertexId(reader.u64()?));
    }

    let mut filter = Filter {
        src,
        trg,
        vgen,
        ..Filter::default()
    };

    let count = reader.u32()? as usize;
    for _ in 0..count {
        let vid = VertexId(reader.u64()?);
        let blob_len = reader.u32()? as usize;
        if blob_len > MAX_RECORD_BYTES {
            return err(vid, ErrorKind::CodecOverflow);
        }
        let entry = if blob_len == 0 {
            None
        } else {
            Some(decode_vertex(reader.take(blob_len)?)?)
        };
        filter.s_tab.insert(vid, entry);
    }

    let count = reader.u32()? as usize;
    for _ in 0..count {
        let vid = VertexId(reader.u64()?);
        let key = decode_key(&mut reader)?;
        filter.k_map.insert(vid, key);
    }

    if !reader.is_done() {
        return err(VertexId::NONE, ErrorKind::CodecSizeGarbled);
    }
    Ok(filter)
}

pub fn decode_journal_state(blob: &[u8]) -> Result<JournalState> {
    let mut reader = Reader::new(blob);
    if reader.u8()? != TAG_FQS {
        return err(VertexId::NONE, ErrorKind::CodecWrongType);
    }
    let tier_count = reader.u8()? as usize;
    let mut tiers = Vec::with_capacity(tier_count);
    for _ in 0..tier_count {
        let serial = reader.u64()?;
        let count = reader.u32()? as usize;
        let mut tier = TierState {
            serial,
            entries: Vec::with_capacity(count),
        };
        for _ in 0..count {
            let qid = crate::journal::QueueId(reader.u64()?);
            let fid_lo = crate::journal::FilterId(reader.u64()?);
            let fid_hi = crate::journal::FilterId(reader.u64()?);
            tier.entries.push(crate::journal::EntryMeta {
                qid,
                fid_lo,
                fid_hi,
            });
        }
        tiers.push(tier);
    }
    if !reader.is_done() {
        return err(VertexId::NONE, ErrorKind::CodecSizeGarbled);
    }
    Ok(JournalState { tiers })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vertex::keccak;

    fn sample_vertices() -> Vec<Vertex> {
        let mut children = [None; 16];
        children[0] = Some(VertexId(2));
        children[7] = Some(VertexId(3));
        children[15] = Some(VertexId(4));
        vec![
            Vertex::Leaf {
                pfx: Nibbles::from_hex(vec![1, 2, 3]),
                payload: Payload::Raw(vec![0xc0]),
            },
            Vertex::Leaf {
                pfx: Nibbles::default(),
                payload: Payload::Storage(vec![0x01, 0x02]),
            },
            Vertex::Leaf {
                pfx: Nibbles::from_hex(vec![0xF]),
                payload: Payload::Account(AccountPayload {
                    nonce: 7,
                    balance: U256::from(12345u64),
                    storage_root: Some(VertexId(9)),
                    code_hash: keccak(b"code"),
                }),
            },
            Vertex::Ext {
                pfx: Nibbles::from_hex(vec![4, 5]),
                vid: VertexId(8),
            },
            Vertex::Branch { children },
        ]
    }

    #[test]
    fn vertex_roundtrip() {
        for vtx in sample_vertices() {
            let blob = encode_vertex(&vtx).unwrap();
            assert_eq!(decode_vertex(&blob).unwrap(), vtx, "{vtx:?}");
        }
    }

    #[test]
    fn truncated_vertex_blob_is_too_short() {
        // raw/storage payloads have a variable tail, so only fixed-layout
        // vertices can assert failure for every cut
        for vtx in sample_vertices() {
            if matches!(
                &vtx,
                Vertex::Leaf {
                    payload: Payload::Raw(_) | Payload::Storage(_),
                    ..
                }
            ) {
                continue;
            }
            let blob = encode_vertex(&vtx).unwrap();
            for cut in 0..blob.len() {
                let result = decode_vertex(&blob[..cut]);
                assert!(result.is_err(), "{vtx:?} cut at {cut}");
            }
        }
    }

    #[test]
    fn wrong_tag_is_rejected() {
        assert_eq!(
            decode_vertex(&[0x77]).unwrap_err().kind,
            ErrorKind::CodecWrongType
        );
        assert_eq!(
            decode_idg(&[TAG_FILTER]).unwrap_err().kind,
            ErrorKind::CodecWrongType
        );
    }

    #[test]
    fn oversized_prefix_overflows() {
        let vtx = Vertex::Leaf {
            pfx: Nibbles::from_hex(vec![1; 65]),
            payload: Payload::Raw(vec![]),
        };
        assert_eq!(
            encode_vertex(&vtx).unwrap_err().kind,
            ErrorKind::CodecOverflow
        );
    }

    #[test]
    fn idg_roundtrip() {
        let state = vec![VertexId(3), VertexId(5), VertexId(9)];
        assert_eq!(decode_idg(&encode_idg(&state)).unwrap(), state);
        assert_eq!(decode_idg(&encode_idg(&[])).unwrap(), vec![]);
    }

    #[test]
    fn filter_roundtrip_and_determinism() {
        let mut filter = Filter {
            src: HashKey::Hash(keccak(b"src")),
            trg: HashKey::Hash(keccak(b"trg")),
            vgen: vec![VertexId(5)],
            ..Filter::default()
        };
        for (i, vtx) in sample_vertices().into_iter().enumerate() {
            filter.s_tab.insert(VertexId(10 + i as u64), Some(vtx));
        }
        filter.s_tab.insert(VertexId(99), None);
        filter.k_map.insert(VertexId(10), HashKey::from_rlp(&[0xc1, 0x80]));
        filter.k_map.insert(VertexId(11), HashKey::Void);
        filter.k_map.insert(VertexId(12), HashKey::Hash(keccak(b"k")));

        let blob = encode_filter(&filter).unwrap();
        let decoded = decode_filter(&blob).unwrap();
        assert_eq!(decoded, filter);
        // same content re-encodes byte-identically
        assert_eq!(encode_filter(&decoded).unwrap(), blob);
    }

    #[test]
    fn truncated_filter_blob_is_rejected() {
        let filter = Filter {
            src: HashKey::Hash(keccak(b"a")),
            trg: HashKey::Hash(keccak(b"b")),
            vgen: vec![VertexId(2)],
            ..Filter::default()
        };
        let blob = encode_filter(&filter).unwrap();
        for cut in 0..blob.len() {
            assert!(decode_filter(&blob[..cut]).is_err());
        }
    }

    #[test]
    fn journal_state_roundtrip() {
        use crate::journal::{EntryMeta, FilterId, QueueId};
        let state = JournalState {
            tiers: vec![
                TierState {
                    serial: 4,
                    entries: vec![
                        EntryMeta {
                            qid: QueueId::new(0, 3),
                            fid_lo: FilterId(4),
                            fid_hi: FilterId(4),
                        },
                        EntryMeta {
                            qid: QueueId::new(0, 2),
                            fid_lo: FilterId(3),
                            fid_hi: FilterId(3),
                        },
                    ],
                },
                TierState {
                    serial: 1,
                    entries: vec![EntryMeta {
                        qid: QueueId::new(1, 0),
                        fid_lo: FilterId(1),
                        fid_hi: FilterId(2),
                    }],
                },
            ],
        };
        let blob = encode_journal_state(&state);
        assert_eq!(decode_journal_state(&blob).unwrap(), state);
    }
}
