// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Banded edge storage.
//!
//! An [`Edge`] is a polyline of fixed-point points that is monotonic in y, together with a
//! winding sign. Edges are kept in an arena (a set of growable vectors) and referenced by index.
//! Each band of the destination owns a singly linked list of links into that arena; an edge whose
//! y range spans several bands is linked into every one of them.

use crate::error::RasterError;
use crate::fixed::{BoxI, EdgePoint, FIXED_SHIFT};
use core::mem::size_of;
use core::ops::RangeInclusive;

/// Marks the end of a linked list.
const NO_LINK: u32 = u32::MAX;

/// A monotonic polyline edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    /// Index of the first point in the point arena.
    start: u32,
    /// Number of points, at least 2.
    len: u32,
    /// Set if the edge was emitted bottom to top, which makes its contribution negative.
    sign_bit: bool,
}

impl Edge {
    /// The winding direction, `+1` for edges going down and `-1` for edges going up.
    pub fn winding(&self) -> i32 {
        if self.sign_bit { -1 } else { 1 }
    }

    /// Whether the edge contributes negatively.
    pub fn sign_bit(&self) -> bool {
        self.sign_bit
    }
}

#[derive(Clone, Copy, Debug)]
struct EdgeLink {
    edge: u32,
    next: u32,
}

/// A singly linked list of edges stored in an [`EdgeStorage`] or an [`EdgeSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeList {
    head: u32,
    tail: u32,
}

impl EdgeList {
    /// The empty list.
    pub const EMPTY: Self = Self {
        head: NO_LINK,
        tail: NO_LINK,
    };

    /// Whether the list has no edges.
    pub fn is_empty(&self) -> bool {
        self.head == NO_LINK
    }

    fn append(&mut self, links: &mut [EdgeLink], link: u32) {
        if self.is_empty() {
            self.head = link;
        } else {
            links[self.tail as usize].next = link;
        }
        self.tail = link;
    }
}

/// A borrowed edge: its points (sorted by ascending y) and its winding.
#[derive(Clone, Copy, Debug)]
pub struct EdgeRef<'a> {
    /// The points of the polyline, `points[i].y <= points[i + 1].y` for well-formed edges.
    pub points: &'a [EdgePoint],
    /// `+1` or `-1`.
    pub winding: i32,
}

impl EdgeRef<'_> {
    /// The topmost y coordinate.
    pub fn y0(&self) -> i32 {
        self.points[0].y
    }

    /// The bottommost y coordinate.
    pub fn y1(&self) -> i32 {
        self.points[self.points.len() - 1].y
    }
}

/// Borrowed view over the arenas, shared by [`EdgeStorage`] and [`EdgeSet`].
#[derive(Clone, Copy, Debug)]
struct Arena<'a> {
    points: &'a [EdgePoint],
    edges: &'a [Edge],
    links: &'a [EdgeLink],
}

impl<'a> Arena<'a> {
    fn edge(&self, idx: u32) -> EdgeRef<'a> {
        let edge = self.edges[idx as usize];
        let start = edge.start as usize;

        EdgeRef {
            points: &self.points[start..start + edge.len as usize],
            winding: edge.winding(),
        }
    }

    fn iter(self, list: EdgeList) -> EdgeIter<'a> {
        EdgeIter {
            arena: self,
            link: list.head,
        }
    }
}

/// Iterator over the edges of an [`EdgeList`].
#[derive(Clone, Debug)]
pub struct EdgeIter<'a> {
    arena: Arena<'a>,
    link: u32,
}

impl<'a> Iterator for EdgeIter<'a> {
    type Item = EdgeRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.link == NO_LINK {
            return None;
        }

        let link = self.arena.links[self.link as usize];
        self.link = link.next;

        Some(self.arena.edge(link.edge))
    }
}

/// Storage of edges partitioned into bands.
#[derive(Debug)]
pub struct EdgeStorage {
    points: Vec<EdgePoint>,
    edges: Vec<Edge>,
    links: Vec<EdgeLink>,
    bands: Vec<EdgeList>,
    bounding_box: BoxI,
    band_height: u32,
    fixed_band_height_shift: u32,
    byte_limit: Option<usize>,
}

impl EdgeStorage {
    /// Create an edge storage for `band_count` bands of `band_height` rows each.
    ///
    /// # Panics
    ///
    /// Panics if `band_height` isn't a power of two.
    pub fn new(band_count: u32, band_height: u32) -> Self {
        assert!(
            band_height.is_power_of_two(),
            "band height must be a power of two"
        );

        Self {
            points: Vec::new(),
            edges: Vec::new(),
            links: Vec::new(),
            bands: vec![EdgeList::EMPTY; band_count as usize],
            bounding_box: BoxI::EMPTY,
            band_height,
            fixed_band_height_shift: band_height.trailing_zeros() + FIXED_SHIFT,
            byte_limit: None,
        }
    }

    /// Limit the memory the arenas may reserve, in bytes. Exceeding the limit makes the
    /// offending operation fail with [`RasterError::OutOfMemory`].
    pub fn set_byte_limit(&mut self, limit: Option<usize>) {
        self.byte_limit = limit;
    }

    /// The number of bands.
    pub fn band_count(&self) -> u32 {
        self.bands.len() as u32
    }

    /// The height of a band in pixels.
    pub fn band_height(&self) -> u32 {
        self.band_height
    }

    /// The shift that maps a fixed-point y coordinate to its band index.
    pub fn fixed_band_height_shift(&self) -> u32 {
        self.fixed_band_height_shift
    }

    /// The bounding box of all committed edges, in fixed point.
    pub fn bounding_box(&self) -> BoxI {
        self.bounding_box
    }

    /// Whether no edge was committed since the last [`clear`](Self::clear).
    pub fn is_empty(&self) -> bool {
        self.bounding_box.is_sentinel()
    }

    /// The number of committed edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// The first band touched by the bounding box.
    ///
    /// Only meaningful if the storage isn't empty.
    pub fn band_start(&self) -> u32 {
        (self.bounding_box.y0.max(0) as u32) >> self.fixed_band_height_shift
    }

    /// The last band touched by the bounding box, inclusive.
    ///
    /// A bounding box can end exactly at a band boundary, in which case the band just below is
    /// returned as well. It is always safe to probe one band too many.
    pub fn band_end(&self) -> u32 {
        let end = (self.bounding_box.y1.max(0) as u32) >> self.fixed_band_height_shift;
        end.min(self.band_count().saturating_sub(1))
    }

    /// The inclusive range of bands that may hold edges, `None` if the storage is empty.
    pub fn band_range(&self) -> Option<RangeInclusive<u32>> {
        (!self.is_empty()).then(|| self.band_start()..=self.band_end())
    }

    /// The band a fixed-point y coordinate falls into.
    #[inline(always)]
    pub fn band_of(&self, fixed_y: i32) -> u32 {
        (fixed_y.max(0) as u32) >> self.fixed_band_height_shift
    }

    /// Iterate over the edges linked into a band.
    pub fn band_edges(&self, band: u32) -> EdgeIter<'_> {
        let list = self
            .bands
            .get(band as usize)
            .copied()
            .unwrap_or(EdgeList::EMPTY);
        self.arena().iter(list)
    }

    /// Iterate over the edges of a list returned by
    /// [`flatten_edge_links`](Self::flatten_edge_links).
    pub fn list_edges(&self, list: EdgeList) -> EdgeIter<'_> {
        self.arena().iter(list)
    }

    fn arena(&self) -> Arena<'_> {
        Arena {
            points: &self.points,
            edges: &self.edges,
            links: &self.links,
        }
    }

    fn reserved_bytes(&self) -> usize {
        self.points.capacity() * size_of::<EdgePoint>()
            + self.edges.capacity() * size_of::<Edge>()
            + self.links.capacity() * size_of::<EdgeLink>()
    }

    /// Make room for at least `needed` more elements, doubling the capacity when possible.
    ///
    /// `reserved` is what all arenas take up right now, the growth has to fit the byte limit on
    /// top of it.
    fn grow<T>(
        vec: &mut Vec<T>,
        needed: usize,
        byte_limit: Option<usize>,
        reserved: usize,
    ) -> Result<(), RasterError> {
        let additional = vec.capacity().max(64).max(needed);

        if let Some(limit) = byte_limit {
            if reserved + additional * size_of::<T>() > limit {
                return Err(RasterError::OutOfMemory);
            }
        }

        vec.try_reserve(additional)
            .map_err(|_| RasterError::OutOfMemory)
    }

    /// The index the next point will be stored at. Used by the edge builder to open an edge.
    pub(crate) fn point_mark(&self) -> u32 {
        self.points.len() as u32
    }

    /// The last pushed point.
    pub(crate) fn last_point(&self) -> Option<EdgePoint> {
        self.points.last().copied()
    }

    /// Append a point to the edge currently being built.
    #[inline]
    pub(crate) fn push_point(&mut self, p: EdgePoint) -> Result<(), RasterError> {
        if self.points.len() == self.points.capacity() {
            let reserved = self.reserved_bytes();
            Self::grow(&mut self.points, 1, self.byte_limit, reserved)?;
        }

        self.points.push(p);
        Ok(())
    }

    /// Drop the points pushed since `start`.
    pub(crate) fn cancel_edge(&mut self, start: u32) {
        self.points.truncate(start as usize);
    }

    /// Commit the points pushed since `start` as one edge.
    ///
    /// `ascending` means the points were pushed with decreasing y, in which case they are
    /// reversed so that stored edges always go top to bottom, and the edge gets a negative sign.
    /// Edges without vertical extent are dropped.
    pub(crate) fn close_edge(&mut self, start: u32, ascending: bool) -> Result<(), RasterError> {
        let len = self.points.len() - start as usize;
        let first = self.points.get(start as usize).copied();
        let last = self.points.last().copied();

        match (first, last) {
            (Some(first), Some(last)) if len >= 2 && first.y != last.y => {}
            _ => {
                self.cancel_edge(start);
                return Ok(());
            }
        }

        if ascending {
            self.points[start as usize..].reverse();
        }

        self.commit(start, len as u32, ascending)
    }

    /// Append a complete edge. The points must be sorted by ascending y.
    pub fn push_edge(&mut self, points: &[EdgePoint], sign_bit: bool) -> Result<(), RasterError> {
        let start = self.point_mark();

        for p in points {
            if let Err(e) = self.push_point(*p) {
                self.cancel_edge(start);
                return Err(e);
            }
        }

        if points.len() < 2 || points[0].y == points[points.len() - 1].y {
            self.cancel_edge(start);
            return Ok(());
        }

        self.commit(start, points.len() as u32, sign_bit)
    }

    fn commit(&mut self, start: u32, len: u32, sign_bit: bool) -> Result<(), RasterError> {
        let pts = &self.points[start as usize..(start + len) as usize];
        let y0 = pts[0].y;
        let y1 = pts[pts.len() - 1].y;

        let first_band = self.band_of(y0);
        let last_band = self.band_of(y1 - 1);

        if last_band >= self.band_count() {
            self.cancel_edge(start);
            return Err(RasterError::invariant("edge outside of the band range"));
        }

        let mut bbox = self.bounding_box;
        for p in pts {
            bbox.add_point(*p);
        }

        let link_count = (last_band - first_band + 1) as usize;
        if self.edges.len() == self.edges.capacity() {
            let reserved = self.reserved_bytes();
            if let Err(e) = Self::grow(&mut self.edges, 1, self.byte_limit, reserved) {
                self.cancel_edge(start);
                return Err(e);
            }
        }
        if self.links.capacity() - self.links.len() < link_count {
            let reserved = self.reserved_bytes();
            if let Err(e) = Self::grow(&mut self.links, link_count, self.byte_limit, reserved) {
                self.cancel_edge(start);
                return Err(e);
            }
        }

        let edge_idx = self.edges.len() as u32;
        self.edges.push(Edge {
            start,
            len,
            sign_bit,
        });

        for band in first_band..=last_band {
            let link = self.links.len() as u32;
            self.links.push(EdgeLink {
                edge: edge_idx,
                next: NO_LINK,
            });
            self.bands[band as usize].append(&mut self.links, link);
        }

        self.bounding_box = bbox;
        Ok(())
    }

    /// Splice the per-band lists into one list in band order, for consumers that process all
    /// bands on a single thread.
    ///
    /// Every edge appears once, at the position of the band it starts in. The band lists are
    /// consumed: afterwards every band reads as empty while the returned list owns the links.
    pub fn flatten_edge_links(&mut self) -> EdgeList {
        let Some(range) = self.band_range() else {
            return EdgeList::EMPTY;
        };

        let mut out = EdgeList::EMPTY;
        for band in range {
            let list = core::mem::replace(&mut self.bands[band as usize], EdgeList::EMPTY);
            let mut link = list.head;

            while link != NO_LINK {
                let EdgeLink { edge, next } = self.links[link as usize];
                let first_point = self.points[self.edges[edge as usize].start as usize];

                if self.band_of(first_point.y) == band {
                    self.links[link as usize].next = NO_LINK;
                    out.append(&mut self.links, link);
                }

                link = next;
            }
        }

        out
    }

    /// Remove all edges while keeping the allocations.
    ///
    /// Only the bands touched by the bounding box are visited.
    pub fn clear(&mut self) {
        if let Some(range) = self.band_range() {
            for band in range {
                self.bands[band as usize] = EdgeList::EMPTY;
            }
        }

        self.points.clear();
        self.edges.clear();
        self.links.clear();
        self.bounding_box = BoxI::EMPTY;
    }

    /// Remove all edges and release the allocations.
    pub fn reset(&mut self) {
        self.clear();
        self.points = Vec::new();
        self.edges = Vec::new();
        self.links = Vec::new();
    }

    /// Copy the committed edges into an immutable [`EdgeSet`] and [`clear`](Self::clear) the
    /// storage, keeping its allocations for the next use.
    pub fn take_edge_set(&mut self) -> EdgeSet {
        let set = match self.band_range() {
            Some(range) => EdgeSet {
                points: self.points.as_slice().into(),
                edges: self.edges.as_slice().into(),
                links: self.links.as_slice().into(),
                bands: self.bands[*range.start() as usize..=*range.end() as usize].into(),
                first_band: *range.start(),
                bounding_box: self.bounding_box,
                fixed_band_height_shift: self.fixed_band_height_shift,
            },
            None => EdgeSet::empty(self.fixed_band_height_shift),
        };

        self.clear();
        set
    }
}

/// An immutable snapshot of the edges of an [`EdgeStorage`].
///
/// This is what a job hands to its command: it can be shared by all workers, each of them
/// reading the band lists of the bands it owns.
#[derive(Debug, Clone)]
pub struct EdgeSet {
    points: Box<[EdgePoint]>,
    edges: Box<[Edge]>,
    links: Box<[EdgeLink]>,
    bands: Box<[EdgeList]>,
    first_band: u32,
    bounding_box: BoxI,
    fixed_band_height_shift: u32,
}

impl EdgeSet {
    fn empty(fixed_band_height_shift: u32) -> Self {
        Self {
            points: Box::new([]),
            edges: Box::new([]),
            links: Box::new([]),
            bands: Box::new([]),
            first_band: 0,
            bounding_box: BoxI::EMPTY,
            fixed_band_height_shift,
        }
    }

    /// Whether the set holds no edges.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// The bounding box of all edges, in fixed point.
    pub fn bounding_box(&self) -> BoxI {
        self.bounding_box
    }

    /// The inclusive range of bands that may hold edges, `None` if the set is empty.
    pub fn band_range(&self) -> Option<RangeInclusive<u32>> {
        (!self.is_empty())
            .then(|| self.first_band..=self.first_band + self.bands.len() as u32 - 1)
    }

    /// Iterate over the edges linked into a band.
    pub fn band_edges(&self, band: u32) -> EdgeIter<'_> {
        let list = band
            .checked_sub(self.first_band)
            .and_then(|idx| self.bands.get(idx as usize))
            .copied()
            .unwrap_or(EdgeList::EMPTY);

        Arena {
            points: &self.points,
            edges: &self.edges,
            links: &self.links,
        }
        .iter(list)
    }

    /// The shift that maps a fixed-point y coordinate to its band index.
    pub fn fixed_band_height_shift(&self) -> u32 {
        self.fixed_band_height_shift
    }
}

#[cfg(test)]
mod tests {
    use super::{Edge, EdgeLink, EdgeList, EdgeStorage};
    use crate::error::RasterError;
    use crate::fixed::{BoxI, EdgePoint};

    fn pt(x: i32, y: i32) -> EdgePoint {
        EdgePoint::new(x * 256, y * 256)
    }

    #[test]
    fn diagonal_edge_spans_both_bands() {
        let mut storage = EdgeStorage::new(2, 4);
        storage.push_edge(&[pt(0, 0), pt(8, 8)], false).unwrap();

        assert_eq!(storage.band_edges(0).count(), 1);
        assert_eq!(storage.band_edges(1).count(), 1);
        assert_eq!(storage.band_start(), 0);
        assert_eq!(storage.band_end(), 1);
    }

    #[test]
    fn edge_ending_on_band_boundary() {
        let mut storage = EdgeStorage::new(4, 4);
        storage.push_edge(&[pt(1, 0), pt(1, 4)], false).unwrap();

        // The edge itself only lives in band 0, but the bounding box ends exactly at the start
        // of band 1, which is probed as well.
        assert_eq!(storage.band_edges(0).count(), 1);
        assert_eq!(storage.band_edges(1).count(), 0);
        assert_eq!(storage.band_range(), Some(0..=1));
    }

    #[test]
    fn horizontal_edges_are_dropped() {
        let mut storage = EdgeStorage::new(2, 4);
        storage.push_edge(&[pt(0, 3), pt(5, 3)], false).unwrap();

        assert!(storage.is_empty());
        assert_eq!(storage.edge_count(), 0);
    }

    #[test]
    fn clear_restores_sentinel() {
        let mut storage = EdgeStorage::new(4, 4);
        storage.push_edge(&[pt(0, 2), pt(3, 13)], true).unwrap();
        assert_eq!(storage.bounding_box(), BoxI::new(0, 512, 768, 13 * 256));

        storage.clear();
        assert!(storage.is_empty());
        assert_eq!(storage.bounding_box(), BoxI::EMPTY);
        for band in 0..4 {
            assert_eq!(storage.band_edges(band).count(), 0);
        }
    }

    #[test]
    fn flatten_keeps_band_order_without_duplicates() {
        let mut storage = EdgeStorage::new(4, 4);
        // Starts in band 2.
        storage.push_edge(&[pt(3, 9), pt(3, 12)], false).unwrap();
        // Spans bands 0..=2.
        storage.push_edge(&[pt(1, 1), pt(2, 10)], true).unwrap();
        // Band 1 only.
        storage.push_edge(&[pt(5, 5), pt(5, 6)], false).unwrap();

        let list = storage.flatten_edge_links();
        let starts: Vec<i32> = storage.list_edges(list).map(|e| e.y0() / 256).collect();

        assert_eq!(starts, vec![1, 5, 9]);
        for band in 0..4 {
            assert_eq!(storage.band_edges(band).count(), 0);
        }
        assert_ne!(list, EdgeList::EMPTY);
    }

    #[test]
    fn byte_limit_reports_out_of_memory() {
        let mut storage = EdgeStorage::new(1, 64);
        storage.set_byte_limit(Some(16));

        assert_eq!(
            storage.push_edge(&[pt(0, 0), pt(1, 1)], false),
            Err(RasterError::OutOfMemory)
        );
        assert!(storage.is_empty());
    }

    #[test]
    fn byte_limit_covers_links_of_long_edges() {
        // One link per band, more than the minimum growth of an arena.
        let bands = 100;
        let limit = 64 * size_of::<EdgePoint>()
            + 64 * size_of::<Edge>()
            + bands as usize * size_of::<EdgeLink>();

        let mut storage = EdgeStorage::new(bands, 1);
        storage.set_byte_limit(Some(limit - 1));
        assert_eq!(
            storage.push_edge(&[pt(0, 0), pt(1, 100)], false),
            Err(RasterError::OutOfMemory)
        );
        assert!(storage.is_empty());
        assert!(storage.reserved_bytes() < limit);

        let mut storage = EdgeStorage::new(bands, 1);
        storage.set_byte_limit(Some(limit));
        storage.push_edge(&[pt(0, 0), pt(1, 100)], false).unwrap();
        assert_eq!(storage.band_edges(99).count(), 1);
        assert!(storage.reserved_bytes() <= limit);
    }

    #[test]
    fn edge_set_snapshot() {
        let mut storage = EdgeStorage::new(4, 4);
        storage.push_edge(&[pt(0, 5), pt(4, 14)], false).unwrap();

        let set = storage.take_edge_set();
        assert!(storage.is_empty());
        assert_eq!(set.band_range(), Some(1..=3));
        assert_eq!(set.band_edges(0).count(), 0);
        assert_eq!(set.band_edges(1).count(), 1);
        assert_eq!(set.band_edges(3).count(), 1);
        assert_eq!(set.band_edges(7).count(), 0);
    }
}
