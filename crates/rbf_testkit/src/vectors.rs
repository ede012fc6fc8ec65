//! Format test vectors for RBF.
//!
//! These vectors pin the on-disk byte layout so that any reader in any
//! language can check itself against the same frames.

use serde::{Deserialize, Serialize};

/// Bytes of a freshly created log.
pub const HEADER_ONLY_HEX: &str = "52424631";

/// One frame and the exact bytes it must produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Caller tag.
    pub tag: u32,
    /// Payload bytes (hex-encoded).
    pub payload_hex: String,
    /// Tail meta bytes (hex-encoded).
    pub tail_meta_hex: String,
    /// Whether the frame is a tombstone.
    pub is_tombstone: bool,
    /// Frame bytes followed by the trailing fence (hex-encoded).
    pub expected_hex: String,
}

/// A ticket and its packed 64-bit form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Frame offset.
    pub offset: u64,
    /// Frame length.
    pub length: u32,
    /// Packed value, big-endian hex.
    pub packed_hex: String,
}

/// Frame encoding vectors, each appended to an empty log.
pub fn frame_vectors() -> Vec<FrameVector> {
    vec![
        FrameVector {
            id: "frame_empty".into(),
            description: "Empty payload and tail meta, tag 0".into(),
            tag: 0,
            payload_hex: String::new(),
            tail_meta_hex: String::new(),
            is_tombstone: false,
            expected_hex: "18000000000000003440678600000000000000001800000052424631".into(),
        },
        FrameVector {
            id: "frame_hello".into(),
            description: "Five byte payload, three bytes of padding".into(),
            tag: 1,
            payload_hex: "68656c6c6f".into(),
            tail_meta_hex: String::new(),
            is_tombstone: false,
            expected_hex:
                "2000000068656c6c6f000000b3ed03908eacc2c200000060010000002000000052424631"
                    .into(),
        },
        FrameVector {
            id: "frame_tail_meta".into(),
            description: "Payload 'abc' with tail meta 'xy'".into(),
            tag: 0x2A,
            payload_hex: "616263".into(),
            tail_meta_hex: "7879".into(),
            is_tombstone: false,
            expected_hex:
                "20000000616263787900000059bce82278308c88020000602a0000002000000052424631"
                    .into(),
        },
        FrameVector {
            id: "frame_tombstone".into(),
            description: "Empty tombstone, tag 7".into(),
            tag: 7,
            payload_hex: String::new(),
            tail_meta_hex: String::new(),
            is_tombstone: true,
            expected_hex: "18000000000000006871676900000080070000001800000052424631".into(),
        },
        FrameVector {
            id: "frame_no_padding".into(),
            description: "Payload and tail meta fill a word exactly".into(),
            tag: 0xDEAD_BEEF,
            payload_hex: "524246".into(),
            tail_meta_hex: "01".into(),
            is_tombstone: false,
            expected_hex: "1c000000524246017d407b59ad3bfcdb01000000efbeadde1c00000052424631"
                .into(),
        },
    ]
}

/// Ticket packing vectors.
pub fn ticket_vectors() -> Vec<TicketVector> {
    vec![
        TicketVector {
            id: "ticket_first_frame".into(),
            offset: 4,
            length: 24,
            packed_hex: "0000000004000006".into(),
        },
        TicketVector {
            id: "ticket_second_frame".into(),
            offset: 36,
            length: 32,
            packed_hex: "0000000024000008".into(),
        },
        TicketVector {
            id: "ticket_max".into(),
            offset: 1_099_511_627_772,
            length: 268_435_452,
            packed_hex: "ffffffffffffffff".into(),
        },
    ]
}

/// Generate all test vectors as JSON for cross-language use.
pub fn all_vectors_json() -> String {
    let vectors = AllTestVectors {
        header_only_hex: HEADER_ONLY_HEX.into(),
        frames: frame_vectors(),
        tickets: ticket_vectors(),
    };

    serde_json::to_string_pretty(&vectors).expect("Failed to serialize vectors")
}

#[derive(Debug, Serialize, Deserialize)]
struct AllTestVectors {
    header_only_hex: String,
    frames: Vec<FrameVector>,
    tickets: Vec<TicketVector>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestLog;
    use crate::golden::{assert_hex_eq, hex_decode};
    use rbf_core::Ticket;

    #[test]
    fn test_header_only_vector() {
        let log = TestLog::memory();
        assert_hex_eq("header_only", &log.bytes(), HEADER_ONLY_HEX);
    }

    #[test]
    fn test_frame_vectors() {
        for vector in frame_vectors() {
            let log = TestLog::memory();
            let payload = hex_decode(&vector.payload_hex);
            let tail_meta = hex_decode(&vector.tail_meta_hex);

            let ticket = if vector.is_tombstone {
                log.append_tombstone(vector.tag, &payload, &tail_meta)
            } else {
                log.append(vector.tag, &payload, &tail_meta)
            }
            .unwrap();

            assert_eq!(ticket.offset(), 4, "Vector {}", vector.id);
            assert_hex_eq(&vector.id, &log.bytes()[4..], &vector.expected_hex);
        }
    }

    #[test]
    fn test_frame_vectors_decode() {
        for vector in frame_vectors() {
            let mut bytes = hex_decode(HEADER_ONLY_HEX);
            bytes.extend(hex_decode(&vector.expected_hex));
            let backend = rbf_storage::InMemoryBackend::with_data(bytes);
            let file = rbf_core::RbfFile::open_with_backend(
                Box::new(backend),
                rbf_core::RbfConfig::default(),
            )
            .unwrap();

            let info = file.scan_reverse(true).next().unwrap();
            let mut buf = vec![0u8; info.ticket().length() as usize];
            let frame = file.read_frame(info.ticket(), &mut buf).unwrap();
            assert_eq!(frame.tag(), vector.tag, "Vector {}", vector.id);
            assert_eq!(frame.payload(), hex_decode(&vector.payload_hex).as_slice());
            assert_eq!(frame.tail_meta(), hex_decode(&vector.tail_meta_hex).as_slice());
            assert_eq!(frame.is_tombstone(), vector.is_tombstone);
        }
    }

    #[test]
    fn test_ticket_vectors() {
        for vector in ticket_vectors() {
            let ticket = Ticket::new(vector.offset, vector.length).unwrap();
            assert_eq!(
                format!("{:016x}", ticket.to_packed()),
                vector.packed_hex,
                "Vector {}",
                vector.id
            );
            assert_eq!(Ticket::from_packed(ticket.to_packed()), ticket);
        }
    }

    #[test]
    fn test_all_vectors_json() {
        let json = all_vectors_json();
        assert!(json.contains("frame_tombstone"));
        assert!(json.contains("ticket_max"));
        let parsed: AllTestVectors = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.frames.len(), frame_vectors().len());
    }
}
