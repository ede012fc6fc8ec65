//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random frames and append sequences.

use proptest::prelude::*;
use rbf_core::RbfFile;
use rbf_core::Ticket;

/// One frame to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSpec {
    /// Caller tag.
    pub tag: u32,
    /// Payload bytes.
    pub payload: Vec<u8>,
    /// Tail meta bytes.
    pub tail_meta: Vec<u8>,
    /// Whether to append as a tombstone.
    pub tombstone: bool,
}

impl FrameSpec {
    /// Appends this frame to `file`.
    pub fn append_to(&self, file: &RbfFile) -> Ticket {
        let result = if self.tombstone {
            file.append_tombstone(self.tag, &self.payload, &self.tail_meta)
        } else {
            file.append(self.tag, &self.payload, &self.tail_meta)
        };
        result.expect("Failed to append generated frame")
    }
}

/// Strategy for generating payloads (arbitrary bytes).
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

/// Strategy for generating tail meta (short arbitrary bytes).
pub fn tail_meta_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..32)
}

/// Strategy for generating a single live frame.
pub fn frame_strategy() -> impl Strategy<Value = FrameSpec> {
    (any::<u32>(), payload_strategy(), tail_meta_strategy()).prop_map(
        |(tag, payload, tail_meta)| FrameSpec {
            tag,
            payload,
            tail_meta,
            tombstone: false,
        },
    )
}

/// Strategy for generating a frame that is a tombstone about one time in five.
pub fn mixed_frame_strategy() -> impl Strategy<Value = FrameSpec> {
    (frame_strategy(), prop::bool::weighted(0.2)).prop_map(|(mut frame, tombstone)| {
        frame.tombstone = tombstone;
        frame
    })
}

/// Strategy for generating a sequence of frames to append.
pub fn frame_batch_strategy(max_frames: usize) -> impl Strategy<Value = Vec<FrameSpec>> {
    prop::collection::vec(mixed_frame_strategy(), 1..=max_frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestLog;

    proptest! {
        #[test]
        fn appended_frames_read_back(frames in frame_batch_strategy(16)) {
            let log = TestLog::memory();
            let tickets: Vec<_> = frames.iter().map(|f| f.append_to(&log)).collect();

            let mut buf = Vec::new();
            for (spec, ticket) in frames.iter().zip(&tickets) {
                buf.resize(ticket.length() as usize, 0);
                let frame = log.read_frame(*ticket, &mut buf).unwrap();
                prop_assert_eq!(frame.tag(), spec.tag);
                prop_assert_eq!(frame.payload(), spec.payload.as_slice());
                prop_assert_eq!(frame.tail_meta(), spec.tail_meta.as_slice());
                prop_assert_eq!(frame.is_tombstone(), spec.tombstone);
            }
        }

        #[test]
        fn scan_visits_live_frames_newest_first(frames in frame_batch_strategy(16)) {
            let log = TestLog::memory();
            let tickets: Vec<_> = frames.iter().map(|f| f.append_to(&log)).collect();

            let expected: Vec<Ticket> = frames
                .iter()
                .zip(&tickets)
                .rev()
                .filter(|(spec, _)| !spec.tombstone)
                .map(|(_, ticket)| *ticket)
                .collect();
            let mut scan = log.scan_reverse(false);
            let scanned: Vec<Ticket> = scan.by_ref().map(|info| info.ticket()).collect();

            prop_assert!(scan.terminal_error().is_none());
            prop_assert!(scanned.windows(2).all(|w| w[0].offset() > w[1].offset()));
            prop_assert_eq!(scanned, expected);
        }

        #[test]
        fn builder_and_append_agree(frame in frame_strategy()) {
            let direct = TestLog::memory();
            frame.append_to(&direct);

            let staged = TestLog::memory();
            let mut builder = staged.begin_append().unwrap();
            let writer = builder.payload_and_meta().unwrap();
            writer.write_bytes(&frame.payload).unwrap();
            writer.write_bytes(&frame.tail_meta).unwrap();
            builder.end_append(frame.tag, frame.tail_meta.len()).unwrap();
            drop(builder);

            prop_assert_eq!(direct.bytes(), staged.bytes());
        }
    }
}
