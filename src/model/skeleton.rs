//! Joint hierarchy.
//!
//! A [`Skeleton`] is a forest of joints linked by parent indices. The graph is
//! validated when the skeleton is built, so every `Skeleton` value is acyclic
//! and has a parent-before-child evaluation order.

use crate::util::{Error, Mat4, Result, Transform};

/// A single joint with its bind-pose local transform.
#[derive(Clone, Debug, PartialEq)]
pub struct Joint {
    pub name: String,
    /// Parent joint index, `None` for a root.
    pub parent: Option<usize>,
    /// Bind-pose transform relative to the parent.
    pub bind: Transform,
}

impl Joint {
    pub fn new(name: impl Into<String>, parent: Option<usize>, bind: Transform) -> Self {
        Self { name: name.into(), parent, bind }
    }
}

/// Validated joint forest.
#[derive(Clone, Debug, PartialEq)]
pub struct Skeleton {
    joints: Vec<Joint>,
    /// Joint indices, every parent before its children.
    order: Vec<usize>,
}

impl Skeleton {
    /// Build a skeleton, rejecting dangling parents and cycles.
    pub fn new(joints: Vec<Joint>) -> Result<Self> {
        const UNVISITED: u8 = 0;
        const ON_PATH: u8 = 1;
        const DONE: u8 = 2;

        let n = joints.len();
        if n > u16::MAX as usize + 1 {
            return Err(Error::invalid_input(format!("too many joints: {n}")));
        }
        for (i, joint) in joints.iter().enumerate() {
            if let Some(p) = joint.parent {
                if p >= n {
                    return Err(Error::invalid_input(format!(
                        "joint {i} ('{}') has invalid parent index {p}",
                        joint.name
                    )));
                }
            }
        }

        let mut state = vec![UNVISITED; n];
        let mut order = Vec::with_capacity(n);
        let mut path = Vec::new();

        for start in 0..n {
            // Walk up to the first finished ancestor (or a root), then emit
            // the chain top-down.
            let mut current = Some(start);
            while let Some(j) = current {
                match state[j] {
                    DONE => break,
                    ON_PATH => return Err(Error::JointHierarchyCycle { joint: j }),
                    _ => {
                        state[j] = ON_PATH;
                        path.push(j);
                        current = joints[j].parent;
                    }
                }
            }
            while let Some(j) = path.pop() {
                state[j] = DONE;
                order.push(j);
            }
        }

        Ok(Self { joints, order })
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint(&self, index: usize) -> Option<&Joint> {
        self.joints.get(index)
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Joint indices with every parent listed before its children.
    pub fn evaluation_order(&self) -> &[usize] {
        &self.order
    }

    /// Root joint indices.
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.joints.iter().enumerate().filter(|(_, j)| j.parent.is_none()).map(|(i, _)| i)
    }

    /// Find a joint index by name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    /// World matrices for the given per-joint local transforms.
    pub fn world_matrices(&self, locals: &[Transform]) -> Vec<Mat4> {
        debug_assert_eq!(locals.len(), self.joints.len());
        let mut world = vec![Mat4::IDENTITY; self.joints.len()];
        for &j in &self.order {
            let local = locals[j].matrix();
            world[j] = match self.joints[j].parent {
                Some(p) => world[p] * local,
                None => local,
            };
        }
        world
    }

    /// World matrices of the bind pose.
    pub fn bind_world_matrices(&self) -> Vec<Mat4> {
        let locals: Vec<Transform> = self.joints.iter().map(|j| j.bind).collect();
        self.world_matrices(&locals)
    }

    /// Check that every bind transform is finite.
    pub fn check_finite(&self) -> Result<()> {
        match self.joints.iter().position(|j| !j.bind.is_finite()) {
            Some(joint) => Err(Error::NonFiniteTransform { joint, time: None }),
            None => Ok(()),
        }
    }
}
