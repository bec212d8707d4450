//! Skeletal animation encoder.
//!
//! Reduces authored joint animation to the keyframe tracks stored in the
//! file, either verbatim or densely resampled at a fixed frame step.

use crate::model::{Animation, AnimationTrack, Keyframe, Skeleton};
use crate::util::{Error, Frame, Result};

/// How authored tracks become stored tracks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SampleMode {
    /// Emit exactly the authored keyframes.
    KeyframesOnly,
    /// Sample every track at `step` frames over the scene frame range.
    Resample { step: Frame },
}

/// Encode authored tracks (one per joint) into stored animation.
///
/// Fails with [`Error::NonFiniteTransform`] if any bind transform or emitted
/// key is not finite, and with [`Error::InvalidInput`] for a track count that
/// does not match the skeleton, an inverted frame range or a bad step.
#[tracing::instrument(skip_all, fields(joints = skeleton.len(), ?mode))]
pub fn encode_animation(
    skeleton: &Skeleton,
    authored: Vec<AnimationTrack>,
    frame_range: (i32, i32),
    mode: SampleMode,
) -> Result<Animation> {
    skeleton.check_finite()?;
    if authored.len() != skeleton.len() {
        return Err(Error::invalid_input(format!(
            "{} animation tracks for {} joints",
            authored.len(),
            skeleton.len()
        )));
    }

    let tracks = match mode {
        SampleMode::KeyframesOnly => authored,
        SampleMode::Resample { step } => {
            let frames = sample_frames(frame_range, step)?;
            authored
                .iter()
                .enumerate()
                .map(|(joint, track)| resample(joint, track, &frames))
                .collect::<Result<Vec<_>>>()?
        }
    };

    let animation = Animation::new(frame_range, tracks);
    tracing::debug!(keys = animation.num_keys(), "animation encoded");
    Ok(animation)
}

/// Upper bound on resampled keys per track.
pub const MAX_SAMPLES_PER_TRACK: usize = 1 << 20;

/// Sample times from `start` to `end` inclusive.
fn sample_frames((start, end): (i32, i32), step: Frame) -> Result<Vec<Frame>> {
    if !(step.is_finite() && step > 0.0) {
        return Err(Error::invalid_input(format!("resample step must be positive, got {step}")));
    }
    if start > end {
        return Err(Error::invalid_input(format!("frame range {start}..{end} is inverted")));
    }
    let span = end as f64 - start as f64;
    let steps = (span / step as f64 + 1e-4).floor();
    if steps >= MAX_SAMPLES_PER_TRACK as f64 {
        return Err(Error::invalid_input(format!(
            "resampling {start}..{end} every {step} frames exceeds {MAX_SAMPLES_PER_TRACK} keys per track"
        )));
    }
    let count = steps as usize + 1;
    let mut frames: Vec<Frame> = (0..count)
        .map(|k| (start as f64 + k as f64 * step as f64) as Frame)
        .collect();
    if let Some(&last) = frames.last() {
        if end as f64 - last as f64 > 1e-4 && end as Frame > last {
            frames.push(end as Frame);
        }
    }
    Ok(frames)
}

fn resample(joint: usize, track: &AnimationTrack, frames: &[Frame]) -> Result<AnimationTrack> {
    if track.is_empty() {
        return Ok(AnimationTrack::empty());
    }
    let keys = frames
        .iter()
        .filter_map(|&time| track.sample(time).map(|t| Keyframe::new(time, t)))
        .collect();
    // Re-validates monotonicity and finiteness of the sampled keys
    AnimationTrack::new(joint, keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Joint;
    use crate::util::{Transform, Vec3};

    fn skeleton(n: usize) -> Skeleton {
        let joints = (0..n)
            .map(|i| Joint::new(format!("j{i}"), i.checked_sub(1), Transform::IDENTITY))
            .collect();
        Skeleton::new(joints).unwrap()
    }

    fn key(time: f32, x: f32) -> Keyframe {
        Keyframe::new(time, Transform::from_translation(Vec3::new(x, 0.0, 0.0)))
    }

    #[test]
    fn test_keyframes_only_is_verbatim() {
        let track = AnimationTrack::new(0, vec![key(0.0, 0.0), key(7.5, 1.0)]).unwrap();
        let anim = encode_animation(&skeleton(2), vec![track.clone(), AnimationTrack::empty()], (0, 10), SampleMode::KeyframesOnly).unwrap();
        assert_eq!(anim.tracks[0], track);
        assert!(anim.tracks[1].is_empty());
        assert_eq!(anim.frame_range, (0, 10));
    }

    #[test]
    fn test_resample_dense() {
        let track = AnimationTrack::new(0, vec![key(0.0, 0.0), key(4.0, 4.0)]).unwrap();
        let anim = encode_animation(&skeleton(1), vec![track], (0, 4), SampleMode::Resample { step: 1.0 }).unwrap();
        let keys = anim.tracks[0].keys();
        assert_eq!(keys.len(), 5);
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(k.time, i as f32);
            assert!((k.transform.translation.x - i as f32).abs() < 1e-6);
        }
        assert!(keys.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[test]
    fn test_resample_includes_range_end() {
        let frames = sample_frames((0, 5), 2.0).unwrap();
        assert_eq!(frames, vec![0.0, 2.0, 4.0, 5.0]);
        let frames = sample_frames((3, 3), 1.0).unwrap();
        assert_eq!(frames, vec![3.0]);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            encode_animation(&skeleton(2), vec![AnimationTrack::empty()], (0, 1), SampleMode::KeyframesOnly),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(sample_frames((5, 1), 1.0), Err(Error::InvalidInput(_))));
        assert!(matches!(sample_frames((0, 1), 0.0), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_resample_extreme_ranges() {
        let frames = sample_frames((i32::MIN, i32::MAX), 1e9).unwrap();
        assert_eq!(frames.first().copied(), Some(i32::MIN as f32));
        assert_eq!(frames.len(), 6);
        assert!(frames.windows(2).all(|w| w[0] < w[1]));

        assert!(matches!(sample_frames((0, 10), 1e-38), Err(Error::InvalidInput(_))));
        assert!(matches!(sample_frames((0, 1_000_000), 1e-3), Err(Error::InvalidInput(_))));

        let track = AnimationTrack::new(0, vec![key(0.0, 0.0), key(10.0, 1.0)]).unwrap();
        let err = encode_animation(&skeleton(1), vec![track], (0, 10), SampleMode::Resample { step: 1e-38 }).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_non_finite_bind_is_fatal() {
        let mut bad = Transform::IDENTITY;
        bad.rotation.x = f32::NAN;
        let sk = Skeleton::new(vec![Joint::new("root", None, bad)]).unwrap();
        let err = encode_animation(&sk, vec![AnimationTrack::empty()], (0, 1), SampleMode::KeyframesOnly).unwrap_err();
        assert!(matches!(err, Error::NonFiniteTransform { joint: 0, .. }));
    }
}
