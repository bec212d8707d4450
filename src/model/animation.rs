//! Keyframed joint animation.

use crate::util::{Error, Frame, Result, Transform};

/// A joint pose at a point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keyframe {
    /// Time in frames.
    pub time: Frame,
    pub transform: Transform,
}

impl Keyframe {
    pub fn new(time: Frame, transform: Transform) -> Self {
        Self { time, transform }
    }
}

/// Keyframes of one joint, strictly increasing in time.
///
/// An empty track means the joint stays in its bind pose.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimationTrack {
    keys: Vec<Keyframe>,
}

impl AnimationTrack {
    /// Validate and wrap the keyframes of joint `joint`.
    ///
    /// Non-finite times or transforms fail with [`Error::NonFiniteTransform`],
    /// repeated or decreasing times with [`Error::InvalidInput`].
    pub fn new(joint: usize, keys: Vec<Keyframe>) -> Result<Self> {
        for (i, key) in keys.iter().enumerate() {
            if !key.time.is_finite() || !key.transform.is_finite() {
                let time = key.time.is_finite().then_some(key.time);
                return Err(Error::NonFiniteTransform { joint, time });
            }
            if i > 0 && key.time <= keys[i - 1].time {
                return Err(Error::invalid_input(format!(
                    "joint {joint}: keyframe time {} does not follow {}",
                    key.time,
                    keys[i - 1].time
                )));
            }
        }
        Ok(Self { keys })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> &[Keyframe] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Pose at `time`, `None` for an empty track.
    ///
    /// Interpolates between the surrounding keys and holds the first/last key
    /// outside the keyed range.
    pub fn sample(&self, time: Frame) -> Option<Transform> {
        let first = self.keys.first()?;
        let last = self.keys.last()?;
        if time <= first.time {
            return Some(first.transform);
        }
        if time >= last.time {
            return Some(last.transform);
        }
        // first key with key.time > time; guaranteed in 1..len
        let next = self.keys.partition_point(|k| k.time <= time);
        let (a, b) = (&self.keys[next - 1], &self.keys[next]);
        let t = (time - a.time) / (b.time - a.time);
        Some(a.transform.interpolate(&b.transform, t))
    }
}

/// Animation of a whole skeleton: one track per joint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Animation {
    /// Inclusive frame range of the source scene.
    pub frame_range: (i32, i32),
    pub tracks: Vec<AnimationTrack>,
}

impl Animation {
    pub fn new(frame_range: (i32, i32), tracks: Vec<AnimationTrack>) -> Self {
        Self { frame_range, tracks }
    }

    /// Local transforms of every joint at `time`, bind pose where a track is
    /// empty or missing.
    pub fn pose(&self, binds: &[Transform], time: Frame) -> Vec<Transform> {
        binds
            .iter()
            .enumerate()
            .map(|(j, bind)| self.tracks.get(j).and_then(|t| t.sample(time)).unwrap_or(*bind))
            .collect()
    }

    /// Total number of keyframes across all tracks.
    pub fn num_keys(&self) -> usize {
        self.tracks.iter().map(AnimationTrack::len).sum()
    }
}
