//! Image source generation.
//!
//! The forest is stored flat: every node keeps the index of its parent, parents
//! always precede their children, and the nodes of each reflection order occupy
//! one contiguous window of the array.

use crate::math::{Vec3, mirror_point, positions_equal, signed_plane_distance};
use crate::scene::MirrorPlane;
use std::ops::Range;

/// One (possibly mirrored) position of the sound source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSource {
    pub position: Vec3,
    /// Normal of the plane this node was mirrored across (zero for the root)
    pub plane_normal: Vec3,
    /// Plane equation constant `dot(point_on_plane, plane_normal)`
    pub plane_offset: f32,
    /// Index of the node this one was mirrored from; `None` for the real source
    pub parent: Option<usize>,
    /// Number of reflections this node represents
    pub order: u32,
}

impl ImageSource {
    fn root(position: Vec3) -> Self {
        Self {
            position,
            plane_normal: Vec3::ZERO,
            plane_offset: 0.0,
            parent: None,
            order: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Signed distance of `point` from this node's mirror plane
    pub fn plane_distance(&self, point: Vec3) -> f32 {
        point.dot(self.plane_normal) - self.plane_offset
    }
}

/// Image sources of one emitter up to a maximum reflection order.
#[derive(Debug, Clone, Default)]
pub struct ImageSourceForest {
    nodes: Vec<ImageSource>,
    order_ranges: Vec<Range<usize>>,
}

impl ImageSourceForest {
    /// Builds the image sources of `source` for the given planes, breadth first.
    ///
    /// Only parents strictly in front of a plane are mirrored across it. The
    /// node count grows as `planes.len() ^ max_order`.
    pub fn generate(source: Vec3, planes: &[MirrorPlane], max_order: u32) -> Self {
        let mut nodes = vec![ImageSource::root(source)];
        let mut order_ranges = vec![0..1];

        for order in 1..=max_order {
            let previous = order_ranges[order_ranges.len() - 1].clone();
            let begin = nodes.len();

            for parent_index in previous {
                let parent = nodes[parent_index].position;
                for plane in planes {
                    if signed_plane_distance(parent, plane.center, plane.normal) <= 0.0 {
                        continue;
                    }
                    nodes.push(ImageSource {
                        position: mirror_point(parent, plane.center, plane.normal),
                        plane_normal: plane.normal,
                        plane_offset: plane.offset(),
                        parent: Some(parent_index),
                        order,
                    });
                }
            }

            order_ranges.push(begin..nodes.len());
            if begin == nodes.len() {
                // Nothing to mirror at deeper orders either
                break;
            }
        }

        Self {
            nodes,
            order_ranges,
        }
    }

    pub fn nodes(&self) -> &[ImageSource] {
        &self.nodes
    }

    pub fn get(&self, index: usize) -> Option<&ImageSource> {
        self.nodes.get(index)
    }

    /// The real, unmirrored source
    pub fn root(&self) -> Option<&ImageSource> {
        self.nodes.first()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Highest reflection order present in the forest
    pub fn max_order(&self) -> u32 {
        self.nodes.last().map_or(0, |node| node.order)
    }

    /// Indices of the nodes created at `order`
    pub fn order_range(&self, order: u32) -> Range<usize> {
        self.order_ranges
            .get(order as usize)
            .cloned()
            .unwrap_or(self.nodes.len()..self.nodes.len())
    }

    /// Walks from `index` to the root, yielding every node index on the way
    /// (starting with `index` itself).
    pub fn chain(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(
            (index < self.nodes.len()).then_some(index),
            move |&current| self.nodes[current].parent,
        )
    }
}

/// Keeps an image source forest and rebuilds it only when needed.
#[derive(Debug, Clone, Default)]
pub struct ImageSourceGenerator {
    forest: ImageSourceForest,
    built_for: Option<Vec3>,
}

impl ImageSourceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the forest if the source moved or `invalidated` is set.
    ///
    /// Returns whether the forest was rebuilt.
    pub fn update(
        &mut self,
        source: Vec3,
        planes: &[MirrorPlane],
        max_order: u32,
        invalidated: bool,
    ) -> bool {
        let moved = self
            .built_for
            .is_none_or(|previous| !positions_equal(previous, source));
        if !moved && !invalidated {
            return false;
        }

        self.forest = ImageSourceForest::generate(source, planes, max_order);
        self.built_for = Some(source);
        log::debug!(
            "Image sources rebuilt: {} nodes up to order {} from {} planes",
            self.forest.len(),
            self.forest.max_order(),
            planes.len()
        );
        true
    }

    pub fn forest(&self) -> &ImageSourceForest {
        &self.forest
    }

    /// Forgets the current forest so the next update rebuilds it
    pub fn invalidate(&mut self) {
        self.built_for = None;
    }
}
