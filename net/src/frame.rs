// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Owned link-layer frames and the shared handles the stack passes around.

use crate::buffer::{
    BufferAllocationError, BufferPool, Headroom, MemoryBufferNotLongEnough, NotEnoughHeadRoom,
    Prepend, TrimFromStart,
};
use crate::eth::{Classification, ETH_HLEN, TruncatedHeader};
use crate::interface::InterfaceIndex;
use std::ops::Deref;
use std::sync::Arc;

/// A link-layer frame.
///
/// The frame owns its backing memory.  The bytes in front of the current data start (the
/// headroom) are kept, so that headers which processing already consumed can be exposed again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    buf: Vec<u8>,
    data: usize,
    mac_header: Option<usize>,
    mac_len: u16,
    dev: Option<InterfaceIndex>,
    classification: Option<Classification>,
}

/// Errors which may occur while building a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The frame is too short for its link-layer header.
    #[error(transparent)]
    Truncated(#[from] TruncatedHeader),
}

impl Frame {
    /// Headroom reserved in front of frames built with [`Frame::new`].
    pub const DEFAULT_HEADROOM: usize = 32;

    /// Build a frame from wire bytes starting at the link-layer header, as seen on `dev`.
    #[must_use]
    pub fn new(wire: &[u8], dev: InterfaceIndex) -> Frame {
        let mut buf = vec![0; Frame::DEFAULT_HEADROOM];
        buf.extend_from_slice(wire);
        Frame {
            buf,
            data: Frame::DEFAULT_HEADROOM,
            mac_header: Some(Frame::DEFAULT_HEADROOM),
            mac_len: 0,
            dev: Some(dev),
            classification: None,
        }
    }

    /// Build a frame the way the receive path hands it to protocol handlers: the link-layer
    /// header has been consumed, so the data starts at the network header.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Truncated`] if `wire` can not hold an ethernet header.
    pub fn received(wire: &[u8], dev: InterfaceIndex) -> Result<Frame, FrameError> {
        if wire.len() < usize::from(ETH_HLEN) {
            return Err(TruncatedHeader { actual: wire.len() }.into());
        }
        let mut frame = Frame::new(wire, dev);
        frame
            .trim_from_start(ETH_HLEN)
            .map_err(|_| TruncatedHeader { actual: wire.len() })?;
        frame.mac_len = ETH_HLEN;
        Ok(frame)
    }

    /// Make an independent copy of this frame, headroom included.
    ///
    /// The copy shares no memory with `self`: its framing can be changed freely.
    ///
    /// # Errors
    ///
    /// Returns [`BufferAllocationError`] if `pool` can not provide the memory.
    pub fn try_copy(&self, pool: &dyn BufferPool) -> Result<Frame, BufferAllocationError> {
        let mut buf = pool.allocate(self.buf.len())?;
        buf.copy_from_slice(&self.buf);
        Ok(Frame {
            buf,
            data: self.data,
            mac_header: self.mac_header,
            mac_len: self.mac_len,
            dev: self.dev,
            classification: self.classification,
        })
    }

    /// Length of the data, from the current data start to the end of the frame.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len() - self.data
    }

    /// Returns true if there is no data left in the frame.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the link-layer header which sits in front of the data (zero if the data still
    /// starts at the link-layer header).
    #[must_use]
    pub fn mac_len(&self) -> u16 {
        self.mac_len
    }

    /// The frame from the start of its link-layer header to its end, if it has such a header.
    #[must_use]
    pub fn mac_header(&self) -> Option<&[u8]> {
        self.mac_header.map(|start| &self.buf[start..])
    }

    /// The interface this frame was received on or is destined to.
    #[must_use]
    pub fn dev(&self) -> Option<InterfaceIndex> {
        self.dev
    }

    /// Re-target the frame.
    pub fn set_dev(&mut self, dev: InterfaceIndex) {
        self.dev = Some(dev);
    }

    /// The classification recorded by the last interface which handled this frame.
    #[must_use]
    pub fn classification(&self) -> Option<Classification> {
        self.classification
    }

    /// Record a classification.
    pub fn set_classification(&mut self, classification: Classification) {
        self.classification = Some(classification);
    }

    /// Move the data start back over the link-layer header, so that the frame starts at layer 2
    /// again and its length covers the header.
    ///
    /// # Errors
    ///
    /// Returns [`NotEnoughHeadRoom`] if the header is not present in front of the data.
    pub fn push_mac_header(&mut self) -> Result<(), NotEnoughHeadRoom> {
        let mac_len = self.mac_len;
        self.prepend(mac_len)?;
        self.mac_len = 0;
        Ok(())
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.buf[self.data..]
    }
}

impl Headroom for Frame {
    fn headroom(&self) -> u16 {
        u16::try_from(self.data).unwrap_or(u16::MAX)
    }
}

impl Prepend for Frame {
    type Error = NotEnoughHeadRoom;

    fn prepend(&mut self, len: u16) -> Result<&mut [u8], NotEnoughHeadRoom> {
        let len = usize::from(len);
        if len > self.data {
            return Err(NotEnoughHeadRoom);
        }
        self.data -= len;
        Ok(&mut self.buf[self.data..])
    }
}

impl TrimFromStart for Frame {
    type Error = MemoryBufferNotLongEnough;

    fn trim_from_start(&mut self, len: u16) -> Result<&mut [u8], MemoryBufferNotLongEnough> {
        let len = usize::from(len);
        if len > self.len() {
            return Err(MemoryBufferNotLongEnough);
        }
        self.data += len;
        Ok(&mut self.buf[self.data..])
    }
}

/// A counted reference to a [`Frame`] owned by the stack.
///
/// Every consumer the stack hands a frame to receives its own handle.  The frame behind a handle
/// is immutable: a consumer which wants to change framing has to copy it first.  Dropping (or
/// [releasing](FrameRef::release)) a handle gives that consumer's reference back.
#[derive(Debug, Clone)]
pub struct FrameRef(Arc<Frame>);

impl FrameRef {
    /// Wrap a frame into the first handle.
    #[must_use]
    pub fn new(frame: Frame) -> FrameRef {
        FrameRef(Arc::new(frame))
    }

    /// The number of handles currently referring to this frame.
    #[must_use]
    pub fn users(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Returns true if some other consumer holds a handle to the same frame.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.users() > 1
    }

    /// Give this consumer's reference back.
    pub fn release(self) {
        drop(self);
    }

    /// Take the frame back out, if this is the last handle to it.
    ///
    /// # Errors
    ///
    /// Returns the handle unchanged if other handles still exist.
    pub fn try_into_inner(self) -> Result<Frame, FrameRef> {
        Arc::try_unwrap(self.0).map_err(FrameRef)
    }
}

impl Deref for FrameRef {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use crate::buffer::{BufferPool, HeapPool, LimitedPool, Prepend};
    use crate::eth::ETH_HLEN;
    use crate::frame::{Frame, FrameError, FrameRef};
    use crate::interface::InterfaceIndex;
    use pretty_assertions::assert_eq;

    fn eth0() -> InterfaceIndex {
        InterfaceIndex::try_new(2).unwrap()
    }

    fn wire(len: usize) -> Vec<u8> {
        (0..len).map(|i| u8::try_from(i % 251).unwrap()).collect()
    }

    #[test]
    fn received_frames_start_after_the_header() {
        let bytes = wire(100);
        let frame = Frame::received(&bytes, eth0()).unwrap();
        assert_eq!(frame.len(), 100 - usize::from(ETH_HLEN));
        assert_eq!(frame.mac_len(), ETH_HLEN);
        assert_eq!(frame.as_ref(), &bytes[14..]);
        assert_eq!(frame.mac_header().unwrap(), bytes.as_slice());
    }

    #[test]
    fn short_frames_are_refused() {
        assert!(matches!(
            Frame::received(&wire(13), eth0()),
            Err(FrameError::Truncated(_))
        ));
    }

    #[test]
    fn push_mac_header_restores_wire_bytes() {
        bolero::check!().with_type::<Vec<u8>>().for_each(|bytes| {
            let Ok(mut frame) = Frame::received(bytes, eth0()) else {
                assert!(bytes.len() < usize::from(ETH_HLEN));
                return;
            };
            frame.push_mac_header().unwrap();
            assert_eq!(frame.as_ref(), bytes.as_slice());
            assert_eq!(frame.len(), bytes.len());
            assert_eq!(frame.mac_len(), 0);
        });
    }

    #[test]
    fn copies_are_independent() {
        let bytes = wire(64);
        let original = FrameRef::new(Frame::received(&bytes, eth0()).unwrap());
        let mut copy = original.try_copy(&HeapPool::new()).unwrap();
        copy.push_mac_header().unwrap();
        copy.prepend(0).unwrap()[0] = 0xaa;
        copy.set_dev(InterfaceIndex::try_new(9).unwrap());
        assert_eq!(original.as_ref(), &bytes[14..]);
        assert_eq!(original.mac_header().unwrap(), bytes.as_slice());
        assert_eq!(original.dev(), Some(eth0()));
        assert_eq!(original.mac_len(), ETH_HLEN);
    }

    #[test]
    fn copy_fails_when_pool_is_empty() {
        let frame = Frame::received(&wire(64), eth0()).unwrap();
        let pool = LimitedPool::exhausted();
        let err = frame.try_copy(&pool).unwrap_err();
        assert_eq!(err.requested, 64 + Frame::DEFAULT_HEADROOM);
        assert!(pool.allocate(1).is_err());
    }

    #[test]
    fn sharing_follows_handles() {
        let first = FrameRef::new(Frame::new(&wire(60), eth0()));
        assert!(!first.is_shared());
        let second = first.clone();
        assert!(first.is_shared());
        assert_eq!(second.users(), 2);
        second.release();
        assert!(!first.is_shared());
        let third = first.clone();
        let first = first.try_into_inner().unwrap_err();
        third.release();
        assert_eq!(first.try_into_inner().unwrap().len(), 60);
    }

    #[test]
    fn prepend_beyond_headroom_fails() {
        let mut frame = Frame::new(&wire(60), eth0());
        let headroom = u16::try_from(Frame::DEFAULT_HEADROOM).unwrap();
        assert!(frame.prepend(headroom + 1).is_err());
        assert_eq!(frame.len(), 60);
    }
}
