use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Stable index of a parameter buffer inside a [`ParamArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParamHandle(pub(crate) usize);

impl ParamHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ParamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ParamHandle({})", self.0)
    }
}

/// What a parameter buffer represents; fixes its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// `[fx, fy, cx, cy, k1, k2, k3, p1, p2]`
    Intrinsics,
    /// Reference frame to camera, `[ax, ay, az, tx, ty, tz]`.
    Extrinsics,
    /// Target frame to reference frame, `[ax, ay, az, tx, ty, tz]`.
    TargetPose,
    /// `[x, y, z]` in target coordinates.
    Point,
}

impl BlockKind {
    pub const fn dim(self) -> usize {
        match self {
            BlockKind::Intrinsics => 9,
            BlockKind::Extrinsics | BlockKind::TargetPose => 6,
            BlockKind::Point => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamBuffer {
    label: String,
    kind: BlockKind,
    values: DVector<f64>,
}

impl ParamBuffer {
    /// Unique, human-readable name, e.g. `camera/left/extrinsics@2`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn values(&self) -> &DVector<f64> {
        &self.values
    }
}

/// Owner of every parameter buffer of a run. Buffers are never removed
/// individually, so handles stay valid until [`ParamArena::clear`].
#[derive(Debug, Clone, Default)]
pub struct ParamArena {
    buffers: Vec<ParamBuffer>,
}

impl ParamArena {
    pub(crate) fn allocate(
        &mut self,
        label: String,
        kind: BlockKind,
        values: DVector<f64>,
    ) -> ParamHandle {
        debug_assert_eq!(values.len(), kind.dim(), "{label}");
        let handle = ParamHandle(self.buffers.len());
        debug!("allocated {} as {}", label, handle);
        self.buffers.push(ParamBuffer {
            label,
            kind,
            values,
        });
        handle
    }

    pub fn get(&self, handle: ParamHandle) -> Option<&ParamBuffer> {
        self.buffers.get(handle.0)
    }

    pub(crate) fn get_mut(&mut self, handle: ParamHandle) -> Option<&mut ParamBuffer> {
        self.buffers.get_mut(handle.0)
    }

    pub(crate) fn set_values(&mut self, handle: ParamHandle, values: &DVector<f64>) -> bool {
        match self.get_mut(handle) {
            Some(buffer) if buffer.values.len() == values.len() => {
                buffer.values.copy_from(values);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamHandle, &ParamBuffer)> {
        self.buffers
            .iter()
            .enumerate()
            .map(|(idx, buffer)| (ParamHandle(idx), buffer))
    }

    pub(crate) fn clear(&mut self) {
        self.buffers.clear();
    }
}
