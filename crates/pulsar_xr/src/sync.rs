//! Reflection/metadata stream pairing
//!
//! The cubemap and metadata streams are clocked independently by the
//! runtime. A reflection update is only meaningful when both halves are fresh,
//! so frames are read strictly in pairs: with only one side ready nothing is
//! read and its "new" flag survives until the other side catches up.

use serde::Serialize;

use crate::hardware::{CameraMetadata, CubemapFrame, MetadataStream, ReflectionStream};

/// A cubemap and the metadata captured with it. Valid for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PairedFrame {
    pub cubemap: CubemapFrame,
    pub metadata: CameraMetadata,
}

impl PairedFrame {
    /// Capture-time distance between the two halves in nanoseconds
    pub fn skew_ns(&self) -> u64 {
        self.cubemap.timestamp_ns.abs_diff(self.metadata.timestamp_ns)
    }
}

/// Per-tick pairing counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Ticks that produced a paired frame
    pub paired: u64,
    /// Ticks where exactly one stream had a new frame
    pub skewed: u64,
    /// Ticks where neither stream had a new frame
    pub idle: u64,
}

#[derive(Debug, Default)]
pub struct StreamSynchronizer {
    stats: SyncStats,
}

impl StreamSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Read one frame from each stream if, and only if, both have new data.
    pub fn try_get_paired_frame(
        &mut self,
        reflections: &mut dyn ReflectionStream,
        metadata: &mut dyn MetadataStream,
    ) -> Option<PairedFrame> {
        match (reflections.has_new_frame(), metadata.has_new_frame()) {
            (true, true) => {
                let pair = PairedFrame {
                    cubemap: reflections.frame(),
                    metadata: metadata.frame(),
                };
                self.stats.paired += 1;
                tracing::trace!("[XR SYNC] Paired frame, skew {} ns", pair.skew_ns());
                Some(pair)
            }
            (false, false) => {
                self.stats.idle += 1;
                None
            }
            (cubemap_ready, _) => {
                self.stats.skewed += 1;
                tracing::trace!(
                    "[XR SYNC] Waiting for {} stream",
                    if cubemap_ready { "metadata" } else { "cubemap" }
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimMetadataStream, SimReflectionStream};

    #[test]
    fn test_pairs_only_when_both_ready() {
        let (mut cubemaps, cubemap_ctl) = SimReflectionStream::new();
        let (mut metadata, metadata_ctl) = SimMetadataStream::new();
        let mut sync = StreamSynchronizer::new();

        assert!(sync.try_get_paired_frame(&mut cubemaps, &mut metadata).is_none());

        cubemap_ctl.publish(1);
        metadata_ctl.publish(CameraMetadata::default());
        let pair = sync
            .try_get_paired_frame(&mut cubemaps, &mut metadata)
            .expect("both streams ready");
        assert_eq!(pair.cubemap.timestamp_ns, 1);

        // Both flags were consumed; no stale replay.
        assert!(sync.try_get_paired_frame(&mut cubemaps, &mut metadata).is_none());
        assert_eq!(sync.stats(), SyncStats { paired: 1, skewed: 0, idle: 2 });
    }

    #[test]
    fn test_one_tick_skew_loses_no_frame() {
        let (mut cubemaps, cubemap_ctl) = SimReflectionStream::new();
        let (mut metadata, metadata_ctl) = SimMetadataStream::new();
        let mut sync = StreamSynchronizer::new();

        cubemap_ctl.publish(10);
        assert!(sync.try_get_paired_frame(&mut cubemaps, &mut metadata).is_none());
        assert!(cubemap_ctl.has_unread_frame());
        assert_eq!(cubemap_ctl.reads(), 0);

        metadata_ctl.publish(CameraMetadata {
            timestamp_ns: 12,
            ..Default::default()
        });
        let pair = sync
            .try_get_paired_frame(&mut cubemaps, &mut metadata)
            .expect("pending cubemap pairs with late metadata");
        assert_eq!(pair.cubemap.timestamp_ns, 10);
        assert_eq!(pair.skew_ns(), 2);
        assert_eq!(sync.stats().skewed, 1);
    }

    #[test]
    fn test_late_cubemap_pairs_with_pending_metadata() {
        let (mut cubemaps, cubemap_ctl) = SimReflectionStream::new();
        let (mut metadata, metadata_ctl) = SimMetadataStream::new();
        let mut sync = StreamSynchronizer::new();

        metadata_ctl.publish(CameraMetadata {
            timestamp_ns: 20,
            ..Default::default()
        });
        assert!(sync.try_get_paired_frame(&mut cubemaps, &mut metadata).is_none());
        assert!(metadata_ctl.has_unread_frame());
        assert_eq!(metadata_ctl.reads(), 0);

        cubemap_ctl.publish(25);
        let pair = sync
            .try_get_paired_frame(&mut cubemaps, &mut metadata)
            .expect("pending metadata pairs with late cubemap");
        assert_eq!(pair.metadata.timestamp_ns, 20);
        assert_eq!(pair.cubemap.timestamp_ns, 25);
        assert_eq!(pair.skew_ns(), 5);
        assert_eq!(metadata_ctl.reads(), 1);
        assert_eq!(sync.stats(), SyncStats { paired: 1, skewed: 1, idle: 0 });
    }
}
